//! Encoding job submission and progress tracking.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vidkit_client::MediaService;
use vidkit_core::models::{
    Asset, AssetCreationOptions, Job, JobState, MediaProcessor, TaskSpec,
};
use vidkit_core::{Config, JobError, ServiceResult, SubmitError};

const DEFAULT_JOB_NAME: &str = "Encode to SD MP4";
const NO_ERROR_DETAIL: &str = "the service reported an error without detail";

#[derive(Clone, Debug)]
pub struct JobConfig {
    /// Exact processor name to select from.
    pub processor_name: String,
    pub poll_interval: Duration,
    /// Decimal places reported progress is rounded to.
    pub progress_precision: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            processor_name: "Media Encoder Standard".to_string(),
            poll_interval: Duration::from_secs(2),
            progress_precision: 2,
        }
    }
}

impl JobConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            processor_name: config.encoder_name.clone(),
            poll_interval: config.poll_interval,
            progress_precision: config.progress_precision,
        }
    }
}

/// Names and profile of a single-task encoding job.
#[derive(Clone, Debug)]
pub struct EncodingRequest {
    pub job_name: String,
    pub task_name: String,
    pub profile: String,
    pub output_asset_name: String,
    pub output_options: AssetCreationOptions,
}

impl EncodingRequest {
    /// "Encode to SD MP4" job writing to "<asset name> SD".
    pub fn for_asset(asset: &Asset, profile: &str) -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            task_name: format!("{} task", DEFAULT_JOB_NAME),
            profile: profile.to_string(),
            output_asset_name: format!("{} SD", asset.name),
            output_options: AssetCreationOptions::None,
        }
    }
}

/// A submitted job and the processor its task runs on.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub job: Job,
    pub processor: MediaProcessor,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// The asset the (single) task writes into.
    pub fn output_asset_id(&self) -> Option<&str> {
        self.job.tasks.first().map(|t| t.output_asset_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub job_id: String,
    pub state: JobState,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedJob {
    pub job_id: String,
    pub progress: f64,
    pub output_asset_ids: Vec<String>,
    pub polls: usize,
}

/// Highest version among `processors`; ties resolve to the same element every time.
pub fn highest_version(processors: &[MediaProcessor]) -> Option<&MediaProcessor> {
    processors
        .iter()
        .max_by(|a, b| a.parsed_version().cmp(&b.parsed_version()))
}

fn round_progress(progress: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (progress.clamp(0.0, 100.0) * factor).round() / factor
}

pub struct JobOrchestrator {
    service: Arc<dyn MediaService>,
    config: JobConfig,
}

impl JobOrchestrator {
    pub fn new(service: Arc<dyn MediaService>, config: JobConfig) -> Self {
        Self { service, config }
    }

    pub async fn list_processors(&self) -> ServiceResult<Vec<MediaProcessor>> {
        self.service.list_processors(None).await
    }

    /// Highest version of the processor called `name`.
    pub async fn select_processor(&self, name: &str) -> Result<MediaProcessor, SubmitError> {
        let candidates = self.service.list_processors(Some(name)).await?;
        let selected = highest_version(&candidates)
            .cloned()
            .ok_or_else(|| SubmitError::NoProcessorFound {
                name: name.to_string(),
            })?;
        tracing::debug!(
            processor_id = %selected.id,
            version = %selected.version,
            candidates = candidates.len(),
            "Selected media processor"
        );
        Ok(selected)
    }

    pub async fn submit_encoding_job(
        &self,
        asset: &Asset,
        profile: &str,
    ) -> Result<JobHandle, SubmitError> {
        self.submit_with(asset, &EncodingRequest::for_asset(asset, profile))
            .await
    }

    /// Create a one-task job encoding `asset` and submit it.
    #[tracing::instrument(
        skip(self, asset, request),
        fields(asset_id = %asset.id, profile = %request.profile)
    )]
    pub async fn submit_with(
        &self,
        asset: &Asset,
        request: &EncodingRequest,
    ) -> Result<JobHandle, SubmitError> {
        let processor = self.select_processor(&self.config.processor_name).await?;

        let job = self.service.create_job(&request.job_name).await?;
        let task = self
            .service
            .add_task(
                &job.id,
                &TaskSpec {
                    name: request.task_name.clone(),
                    processor_id: processor.id.clone(),
                    profile: request.profile.clone(),
                    input_asset_id: asset.id.clone(),
                    output_asset_name: request.output_asset_name.clone(),
                    output_options: request.output_options,
                },
            )
            .await?;
        let job = self.service.submit_job(&job.id).await?;

        tracing::info!(
            job_id = %job.id,
            task_id = %task.id,
            output_asset_id = %task.output_asset_id,
            "Encoding job submitted"
        );

        Ok(JobHandle { job, processor })
    }

    /// Poll until the job reaches a terminal state or `cancel` fires.
    ///
    /// `on_progress` is called whenever the state or the rounded progress
    /// changes, in the order observed. Canceling only stops the local wait.
    pub async fn await_completion<F>(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<CompletedJob, JobError>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let job_id = handle.job_id().to_string();
        let mut last: Option<(JobState, f64)> = None;
        let mut polls = 0usize;

        loop {
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %job_id, "Stopped waiting for job");
                    return Err(JobError::AwaitCanceled { job_id });
                }
                result = self.service.get_job(&job_id) => result.map_err(|source| JobError::Poll {
                    job_id: job_id.clone(),
                    source,
                })?,
            };
            polls += 1;

            let progress = round_progress(snapshot.progress, self.config.progress_precision);
            if last != Some((snapshot.state, progress)) {
                last = Some((snapshot.state, progress));
                tracing::debug!(
                    job_id = %job_id,
                    state = %snapshot.state,
                    progress,
                    "Job progress"
                );
                on_progress(&JobProgress {
                    job_id: job_id.clone(),
                    state: snapshot.state,
                    progress,
                });
            }

            match snapshot.state {
                JobState::Finished => {
                    tracing::info!(job_id = %job_id, polls, "Job finished");
                    return Ok(CompletedJob {
                        job_id,
                        progress,
                        output_asset_ids: handle.job.output_asset_ids(),
                        polls,
                    });
                }
                JobState::Error => {
                    let detail = snapshot
                        .error_detail
                        .filter(|d| !d.trim().is_empty())
                        .unwrap_or_else(|| NO_ERROR_DETAIL.to_string());
                    tracing::error!(job_id = %job_id, detail = %detail, "Job failed");
                    return Err(JobError::Failed { job_id, detail });
                }
                JobState::Canceled => {
                    tracing::warn!(job_id = %job_id, "Job canceled by the service");
                    return Err(JobError::RemoteCanceled { job_id });
                }
                JobState::Queued | JobState::Scheduled | JobState::Processing => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(job_id = %job_id, "Stopped waiting for job");
                    return Err(JobError::AwaitCanceled { job_id });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidkit_client::{InMemoryMediaService, ScriptStep};

    fn processor(version: &str) -> MediaProcessor {
        MediaProcessor {
            id: format!("mp-{}", version),
            name: "Media Encoder Standard".to_string(),
            version: version.to_string(),
            description: None,
        }
    }

    fn fast_config() -> JobConfig {
        JobConfig {
            poll_interval: Duration::from_millis(1),
            ..JobConfig::default()
        }
    }

    async fn input_asset(service: &InMemoryMediaService) -> Asset {
        let asset = service
            .create_asset("Bitten by the Frost", AssetCreationOptions::None)
            .await
            .unwrap();
        let file = service
            .create_asset_file(&asset.id, "frost.mp4")
            .await
            .unwrap();
        service.set_primary_file(&asset.id, &file.id).await.unwrap();
        service.get_asset(&asset.id).await.unwrap()
    }

    #[test]
    fn highest_version_is_numeric() {
        let processors = vec![processor("1.0"), processor("2.0"), processor("1.1")];
        assert_eq!(highest_version(&processors).unwrap().version, "2.0");

        let processors = vec![processor("2.9"), processor("2.10")];
        assert_eq!(highest_version(&processors).unwrap().version, "2.10");

        assert!(highest_version(&[]).is_none());
    }

    #[test]
    fn progress_is_rounded_and_clamped() {
        assert_eq!(round_progress(33.33333, 2), 33.33);
        assert_eq!(round_progress(66.666, 0), 67.0);
        assert_eq!(round_progress(120.0, 2), 100.0);
        assert_eq!(round_progress(-3.0, 2), 0.0);
    }

    #[test]
    fn request_names_follow_the_input_asset() {
        let asset = Asset {
            id: "a1".to_string(),
            name: "Bitten by the Frost".to_string(),
            options: AssetCreationOptions::None,
            files: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        let request = EncodingRequest::for_asset(&asset, "H264 Multiple Bitrate 16x9 SD");
        assert_eq!(request.job_name, "Encode to SD MP4");
        assert_eq!(request.task_name, "Encode to SD MP4 task");
        assert_eq!(request.output_asset_name, "Bitten by the Frost SD");
    }

    #[tokio::test]
    async fn select_processor_without_match_fails() {
        let service = Arc::new(InMemoryMediaService::new());
        let orchestrator = JobOrchestrator::new(service, fast_config());
        let err = orchestrator
            .select_processor("Media Encoder Nonexistent")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::NoProcessorFound { .. }));
    }

    #[tokio::test]
    async fn submit_wires_input_and_new_output_asset() {
        let service = Arc::new(InMemoryMediaService::new());
        let asset = input_asset(&service).await;
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());

        let handle = orchestrator
            .submit_encoding_job(&asset, "H264 Multiple Bitrate 16x9 SD")
            .await
            .unwrap();

        assert_eq!(handle.processor.version, "4.8");
        assert_eq!(handle.job.tasks.len(), 1);
        let task = &handle.job.tasks[0];
        assert_eq!(task.input_asset_id, asset.id);
        assert_eq!(task.profile, "H264 Multiple Bitrate 16x9 SD");
        let output = service.get_asset(&task.output_asset_id).await.unwrap();
        assert_eq!(output.name, "Bitten by the Frost SD");
        assert!(output.files.is_empty());
    }

    #[tokio::test]
    async fn await_reports_changes_in_order_and_finishes() {
        let service = Arc::new(InMemoryMediaService::new().with_job_script(vec![
            ScriptStep::new(JobState::Queued, 0.0),
            ScriptStep::new(JobState::Queued, 0.0),
            ScriptStep::new(JobState::Processing, 33.3333),
            ScriptStep::new(JobState::Processing, 33.3334),
            ScriptStep::new(JobState::Finished, 100.0),
        ]));
        let asset = input_asset(&service).await;
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());
        let handle = orchestrator
            .submit_encoding_job(&asset, "H264 Multiple Bitrate 16x9 SD")
            .await
            .unwrap();

        let mut seen = Vec::new();
        let completed = orchestrator
            .await_completion(&handle, &CancellationToken::new(), |p| {
                seen.push((p.state, p.progress))
            })
            .await
            .unwrap();

        assert_eq!(
            seen,
            vec![
                (JobState::Queued, 0.0),
                (JobState::Processing, 33.33),
                (JobState::Finished, 100.0),
            ]
        );
        assert_eq!(completed.polls, 5);
        assert_eq!(completed.output_asset_ids, handle.job.output_asset_ids());
    }

    #[tokio::test]
    async fn error_state_carries_provider_detail() {
        let service = Arc::new(InMemoryMediaService::new().with_job_script(vec![
            ScriptStep::new(JobState::Processing, 10.0),
            ScriptStep::error(10.0, "Unsupported input codec"),
        ]));
        let asset = input_asset(&service).await;
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());
        let handle = orchestrator
            .submit_encoding_job(&asset, "H264 Multiple Bitrate 16x9 SD")
            .await
            .unwrap();

        let err = orchestrator
            .await_completion(&handle, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();

        match err {
            JobError::Failed { job_id, detail } => {
                assert_eq!(job_id, handle.job.id);
                assert_eq!(detail, "Unsupported input codec");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_cancel_is_distinct_from_local_cancel() {
        let service = Arc::new(
            InMemoryMediaService::new()
                .with_job_script(vec![ScriptStep::new(JobState::Canceled, 40.0)]),
        );
        let asset = input_asset(&service).await;
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());
        let handle = orchestrator
            .submit_encoding_job(&asset, "H264 Multiple Bitrate 16x9 SD")
            .await
            .unwrap();

        let err = orchestrator
            .await_completion(&handle, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::RemoteCanceled { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_polling() {
        let service = Arc::new(InMemoryMediaService::new());
        let asset = input_asset(&service).await;
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());
        let handle = orchestrator
            .submit_encoding_job(&asset, "H264 Multiple Bitrate 16x9 SD")
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator
            .await_completion(&handle, &cancel, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::AwaitCanceled { .. }));
        assert_eq!(service.poll_count(handle.job_id()), 0);
    }

    #[tokio::test]
    async fn poll_failure_is_reported_with_job_id() {
        let service = Arc::new(InMemoryMediaService::new());
        // A job that was never submitted cannot be polled.
        let job = service.create_job("orphan").await.unwrap();
        let handle = JobHandle {
            job,
            processor: processor("1.0"),
        };
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());

        let err = orchestrator
            .await_completion(&handle, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Poll { .. }));
        assert_eq!(err.job_id(), handle.job_id());
    }

    #[tokio::test]
    async fn output_manifest_is_named_after_asset_without_files() {
        let service = Arc::new(InMemoryMediaService::new());
        let asset = service
            .create_asset("Bare", AssetCreationOptions::None)
            .await
            .unwrap();
        let orchestrator = JobOrchestrator::new(service.clone(), fast_config());
        let handle = orchestrator.submit_encoding_job(&asset, "p").await.unwrap();
        let completed = orchestrator
            .await_completion(&handle, &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        let output = service
            .get_asset(&completed.output_asset_ids[0])
            .await
            .unwrap();
        assert!(output.files.iter().any(|f| f.name == "Bare.ism"));
    }
}
