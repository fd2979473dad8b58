//! End-to-end encode workflow: quota report → upload → encode → streaming URL.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use vidkit_client::MediaService;
use vidkit_core::models::{
    AssetCreationOptions, ReservedUnitSetting, ReservedUnitType, StreamingEndpoint,
};
use vidkit_core::{Config, ServiceError, WorkflowError};

use crate::job::{CompletedJob, EncodingRequest, JobConfig, JobOrchestrator, JobProgress};
use crate::locator::{LocatorResolver, StreamingConfig, StreamingFormat, StreamingUrl};
use crate::quota::QuotaController;
use crate::upload::{UploadConfig, UploadCoordinator, UploadedFile};

#[derive(Clone, Debug)]
pub struct WorkflowRequest {
    pub input_path: PathBuf,
    pub asset_name: String,
    pub asset_options: AssetCreationOptions,
    pub profile: String,
    pub format: StreamingFormat,
    /// Tier whose reserved units are reported before the upload.
    pub report_units_type: ReservedUnitType,
    /// Units to apply before the upload, if any.
    pub reserved_units: Option<(ReservedUnitType, i64)>,
}

impl WorkflowRequest {
    /// HLS output, asset named after the input file's stem.
    pub fn new(input_path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        let input_path = input_path.into();
        let asset_name = asset_name_for(&input_path);
        Self {
            input_path,
            asset_name,
            asset_options: AssetCreationOptions::None,
            profile: profile.into(),
            format: StreamingFormat::Hls,
            report_units_type: ReservedUnitType::Basic,
            reserved_units: None,
        }
    }
}

/// File stem of `path`, or "asset" when it has none.
pub fn asset_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("asset")
        .to_string()
}

/// Progress notifications, delivered in the order they happen.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ReservedUnits { unit_type: ReservedUnitType, units: i64 },
    ReservedUnitsUpdated(ReservedUnitSetting),
    StreamingEndpoints { endpoints: Vec<StreamingEndpoint> },
    AssetCreated { asset_id: String, name: String },
    UploadProgress { percent: f64 },
    Uploaded(UploadedFile),
    JobSubmitted { job_id: String, output_asset_id: String },
    JobProgress(JobProgress),
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    /// `-1` when the count could not be read.
    pub reserved_units: i64,
    pub reserved_units_updated: Option<ReservedUnitSetting>,
    pub streaming_endpoints: Vec<StreamingEndpoint>,
    pub input_asset_id: String,
    pub upload: UploadedFile,
    pub job: CompletedJob,
    pub output_asset_id: String,
    pub streaming: StreamingUrl,
}

/// Wires the four components over one service connection.
pub struct EncodeWorkflow {
    service: Arc<dyn MediaService>,
    uploads: UploadCoordinator,
    jobs: JobOrchestrator,
    locators: LocatorResolver,
    quotas: QuotaController,
}

impl EncodeWorkflow {
    pub fn new(service: Arc<dyn MediaService>, config: &Config) -> Self {
        Self {
            uploads: UploadCoordinator::new(service.clone(), UploadConfig::from_config(config)),
            jobs: JobOrchestrator::new(service.clone(), JobConfig::from_config(config)),
            locators: LocatorResolver::new(service.clone(), StreamingConfig::from_config(config)),
            quotas: QuotaController::new(service.clone()),
            service,
        }
    }

    pub fn service(&self) -> &Arc<dyn MediaService> {
        &self.service
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn jobs(&self) -> &JobOrchestrator {
        &self.jobs
    }

    pub fn locators(&self) -> &LocatorResolver {
        &self.locators
    }

    pub fn quotas(&self) -> &QuotaController {
        &self.quotas
    }

    /// Run every step in order. The first failure aborts the rest; remote
    /// state created so far is left in place.
    pub async fn run(
        &self,
        request: &WorkflowRequest,
        cancel: &CancellationToken,
        observer: &(dyn Fn(WorkflowEvent) + Send + Sync),
    ) -> Result<WorkflowReport, WorkflowError> {
        tracing::info!(
            input = %request.input_path.display(),
            asset_name = %request.asset_name,
            profile = %request.profile,
            format = %request.format,
            "Starting encode workflow"
        );

        let reserved_units = self
            .quotas
            .get_reserved_units(request.report_units_type)
            .await;
        observer(WorkflowEvent::ReservedUnits {
            unit_type: request.report_units_type,
            units: reserved_units,
        });

        let reserved_units_updated = match request.reserved_units {
            Some((unit_type, count)) => {
                let setting = self.quotas.set_reserved_units(unit_type, count).await?;
                observer(WorkflowEvent::ReservedUnitsUpdated(setting));
                Some(setting)
            }
            None => None,
        };

        let streaming_endpoints = self.quotas.list_streaming_endpoints().await?;
        observer(WorkflowEvent::StreamingEndpoints {
            endpoints: streaming_endpoints.clone(),
        });

        let asset = self
            .service
            .create_asset(&request.asset_name, request.asset_options)
            .await?;
        tracing::info!(asset_id = %asset.id, "Asset created");
        observer(WorkflowEvent::AssetCreated {
            asset_id: asset.id.clone(),
            name: asset.name.clone(),
        });

        let upload = self
            .uploads
            .upload(&request.input_path, &asset, |percent| {
                observer(WorkflowEvent::UploadProgress { percent })
            })
            .await?;
        observer(WorkflowEvent::Uploaded(upload.clone()));

        let handle = self
            .jobs
            .submit_with(&asset, &EncodingRequest::for_asset(&asset, &request.profile))
            .await?;
        let output_asset_id = handle
            .output_asset_id()
            .map(String::from)
            .ok_or_else(|| {
                ServiceError::Rejected(format!("job {} has no output asset", handle.job_id()))
            })?;
        observer(WorkflowEvent::JobSubmitted {
            job_id: handle.job_id().to_string(),
            output_asset_id: output_asset_id.clone(),
        });

        let job = self
            .jobs
            .await_completion(&handle, cancel, |progress| {
                observer(WorkflowEvent::JobProgress(progress.clone()))
            })
            .await?;

        let streaming = self
            .locators
            .resolve_for_asset_id(&output_asset_id, &request.format)
            .await?;

        tracing::info!(
            job_id = %job.job_id,
            output_asset_id = %output_asset_id,
            url = %streaming.url,
            "Encode workflow finished"
        );

        Ok(WorkflowReport {
            reserved_units,
            reserved_units_updated,
            streaming_endpoints,
            input_asset_id: asset.id,
            upload,
            job,
            output_asset_id,
            streaming,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_defaults_to_file_stem() {
        let request = WorkflowRequest::new("/videos/Bitten by the Frost.mp4", "profile");
        assert_eq!(request.asset_name, "Bitten by the Frost");
        assert_eq!(request.format, StreamingFormat::Hls);
        assert!(request.reserved_units.is_none());
    }

    #[test]
    fn asset_name_falls_back_when_path_has_no_stem() {
        assert_eq!(asset_name_for(Path::new("/")), "asset");
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(WorkflowEvent::UploadProgress { percent: 50.0 }).unwrap();
        assert_eq!(json["event"], "upload_progress");
        assert_eq!(json["percent"], 50.0);
    }
}
