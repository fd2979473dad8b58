//! In-process simulation of the media service.
//!
//! Deterministic stand-in used by `vidkit --simulate` and by tests. Jobs move
//! one scripted step per poll; when a job finishes, each task's output asset
//! is filled with a Smooth Streaming manifest and MP4 renditions, the way the
//! standard encoder lays them out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use vidkit_core::models::{
    AccessPermission, AccessPolicy, Asset, AssetCreationOptions, AssetFile, EndpointState, Job,
    JobSnapshot, JobState, Locator, LocatorKind, MediaProcessor, ReservedUnitSetting,
    ReservedUnitType, StreamingEndpoint, Task, TaskSpec,
};
use vidkit_core::{ServiceError, ServiceResult};

use crate::traits::{MediaService, TransferProgress};

const SIMULATED_ORIGIN: &str = "https://simulated.vidkit.local";
const SIMULATED_BLOCK_SIZE: usize = 64 * 1024;
const RENDITION_BITRATES: [u32; 3] = [1000, 650, 400];

/// One scripted poll result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub state: JobState,
    pub progress: f64,
    pub error_detail: Option<String>,
}

impl ScriptStep {
    pub fn new(state: JobState, progress: f64) -> Self {
        Self {
            state,
            progress,
            error_detail: None,
        }
    }

    pub fn error(progress: f64, detail: impl Into<String>) -> Self {
        Self {
            state: JobState::Error,
            progress,
            error_detail: Some(detail.into()),
        }
    }
}

/// Queued → Scheduled → Processing (25/60/100) → Finished.
pub fn default_job_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::new(JobState::Queued, 0.0),
        ScriptStep::new(JobState::Scheduled, 0.0),
        ScriptStep::new(JobState::Processing, 25.0),
        ScriptStep::new(JobState::Processing, 60.0),
        ScriptStep::new(JobState::Processing, 100.0),
        ScriptStep::new(JobState::Finished, 100.0),
    ]
}

struct SimJob {
    job: Job,
    submitted: bool,
    step: usize,
    script: Vec<ScriptStep>,
    polls: usize,
    outputs_materialized: bool,
}

struct State {
    assets: HashMap<String, Asset>,
    policies: HashMap<String, AccessPolicy>,
    locators: HashMap<String, Locator>,
    locators_created: Vec<Locator>,
    locators_deleted: Vec<String>,
    processors: Vec<MediaProcessor>,
    jobs: HashMap<String, SimJob>,
    job_script: Vec<ScriptStep>,
    reserved_units: HashMap<ReservedUnitType, ReservedUnitSetting>,
    reserved_units_available: bool,
    endpoints: Vec<StreamingEndpoint>,
    transfer_failure: Option<String>,
}

pub struct InMemoryMediaService {
    state: Mutex<State>,
}

impl Default for InMemoryMediaService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMediaService {
    /// Simulated account with the standard encoder (two versions), one basic
    /// reserved unit and a running default streaming endpoint.
    pub fn new() -> Self {
        let processors = vec![
            simulated_processor("Media Encoder Standard", "4.7"),
            simulated_processor("Media Encoder Standard", "4.8"),
            simulated_processor("Media Encoder Premium Workflow", "1.0"),
        ];
        let mut reserved_units = HashMap::new();
        reserved_units.insert(
            ReservedUnitType::Basic,
            ReservedUnitSetting {
                unit_type: ReservedUnitType::Basic,
                current_units: 1,
            },
        );

        Self {
            state: Mutex::new(State {
                assets: HashMap::new(),
                policies: HashMap::new(),
                locators: HashMap::new(),
                locators_created: Vec::new(),
                locators_deleted: Vec::new(),
                processors,
                jobs: HashMap::new(),
                job_script: default_job_script(),
                reserved_units,
                reserved_units_available: true,
                endpoints: vec![StreamingEndpoint {
                    name: "default".to_string(),
                    scale_units: 0,
                    state: EndpointState::Running,
                }],
                transfer_failure: None,
            }),
        }
    }

    pub fn with_processors(self, processors: Vec<MediaProcessor>) -> Self {
        self.state().processors = processors;
        self
    }

    /// Script applied to jobs submitted from now on.
    pub fn with_job_script(self, script: Vec<ScriptStep>) -> Self {
        self.state().job_script = script;
        self
    }

    /// Remove every reserved unit record from the account.
    pub fn without_reserved_units(self) -> Self {
        self.state().reserved_units.clear();
        self
    }

    /// Make reserved unit calls fail as if the quota API were unreachable.
    pub fn with_unavailable_reserved_units(self) -> Self {
        self.state().reserved_units_available = false;
        self
    }

    pub fn with_streaming_endpoints(self, endpoints: Vec<StreamingEndpoint>) -> Self {
        self.state().endpoints = endpoints;
        self
    }

    /// Make every transfer fail midway with `reason`.
    pub fn with_transfer_failure(self, reason: impl Into<String>) -> Self {
        self.state().transfer_failure = Some(reason.into());
        self
    }

    /// Every locator ever created, in creation order.
    pub fn created_locators(&self) -> Vec<Locator> {
        self.state().locators_created.clone()
    }

    /// Ids of deleted locators, in deletion order.
    pub fn deleted_locators(&self) -> Vec<String> {
        self.state().locators_deleted.clone()
    }

    pub fn active_locators(&self) -> Vec<Locator> {
        self.state().locators.values().cloned().collect()
    }

    pub fn policy(&self, policy_id: &str) -> Option<AccessPolicy> {
        self.state().policies.get(policy_id).cloned()
    }

    /// Number of `get_job` calls made for `job_id`.
    pub fn poll_count(&self, job_id: &str) -> usize {
        self.state().jobs.get(job_id).map(|j| j.polls).unwrap_or(0)
    }

    pub fn asset_count(&self) -> usize {
        self.state().assets.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn simulated_processor(name: &str, version: &str) -> MediaProcessor {
    MediaProcessor {
        id: format!("nb:mpid:UUID:{}", Uuid::new_v4()),
        name: name.to_string(),
        version: version.to_string(),
        description: Some(name.to_string()),
    }
}

fn new_id(prefix: &str) -> String {
    format!("nb:{}:UUID:{}", prefix, Uuid::new_v4())
}

fn mime_type_for(name: &str) -> Option<String> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    let mime = match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "ism" | "ismc" => "application/octet-stream",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime.to_string())
}

/// File stem used for encoder outputs, taken from the input's primary file.
fn output_stem(input: &Asset) -> String {
    input
        .primary_file()
        .or_else(|| input.files.first())
        .and_then(|f| Path::new(&f.name).file_stem())
        .and_then(|s| s.to_str())
        .map(String::from)
        .unwrap_or_else(|| input.name.replace(' ', "_"))
}

fn encoder_outputs(stem: &str, input_size: u64) -> Vec<AssetFile> {
    let mut files = vec![AssetFile {
        id: new_id("fid"),
        name: format!("{}.ism", stem),
        size_bytes: 2048,
        mime_type: mime_type_for("x.ism"),
        is_primary: true,
    }];
    files.push(AssetFile {
        id: new_id("fid"),
        name: format!("{}.ismc", stem),
        size_bytes: 4096,
        mime_type: mime_type_for("x.ismc"),
        is_primary: false,
    });
    for bitrate in RENDITION_BITRATES {
        files.push(AssetFile {
            id: new_id("fid"),
            name: format!("{}_{}.mp4", stem, bitrate),
            size_bytes: input_size / 4,
            mime_type: mime_type_for("x.mp4"),
            is_primary: false,
        });
    }
    files
}

impl State {
    fn asset_mut(&mut self, asset_id: &str) -> ServiceResult<&mut Asset> {
        self.assets
            .get_mut(asset_id)
            .ok_or_else(|| ServiceError::NotFound(format!("asset {}", asset_id)))
    }

    fn sim_job_mut(&mut self, job_id: &str) -> ServiceResult<&mut SimJob> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| ServiceError::NotFound(format!("job {}", job_id)))
    }

    fn materialize_outputs(&mut self, job_id: &str) {
        let tasks = match self.jobs.get(job_id) {
            Some(sim) if !sim.outputs_materialized => sim.job.tasks.clone(),
            _ => return,
        };
        for task in tasks {
            let outputs = match self.assets.get(&task.input_asset_id) {
                Some(input) => {
                    let size = input.primary_file().map(|f| f.size_bytes).unwrap_or(0);
                    encoder_outputs(&output_stem(input), size)
                }
                None => continue,
            };
            if let Some(output) = self.assets.get_mut(&task.output_asset_id) {
                output.files = outputs;
            }
        }
        if let Some(sim) = self.jobs.get_mut(job_id) {
            sim.outputs_materialized = true;
        }
    }

    /// Check that `locator` may currently be used to write into `file`.
    fn check_write_locator(&self, file: &AssetFile, locator: &Locator) -> ServiceResult<String> {
        let live = self
            .locators
            .get(&locator.id)
            .ok_or_else(|| {
                ServiceError::Rejected(format!("locator {} is not active", locator.id))
            })?;
        if live.kind != LocatorKind::Sas {
            return Err(ServiceError::Rejected(
                "upload requires a SAS (write) locator".to_string(),
            ));
        }
        let policy = self
            .policies
            .get(&live.policy_id)
            .ok_or_else(|| ServiceError::NotFound(format!("policy {}", live.policy_id)))?;
        if !policy.allows(AccessPermission::Write) {
            return Err(ServiceError::Rejected(
                "locator policy does not grant write access".to_string(),
            ));
        }
        if !live.is_active_at(Utc::now()) {
            return Err(ServiceError::Rejected(format!(
                "locator {} has expired",
                live.id
            )));
        }
        let asset = self
            .assets
            .get(&live.asset_id)
            .ok_or_else(|| ServiceError::NotFound(format!("asset {}", live.asset_id)))?;
        if asset.file(&file.id).is_none() {
            return Err(ServiceError::NotFound(format!(
                "file {} in asset {}",
                file.id, asset.id
            )));
        }
        Ok(asset.id.clone())
    }
}

#[async_trait]
impl MediaService for InMemoryMediaService {
    async fn create_asset(
        &self,
        name: &str,
        options: AssetCreationOptions,
    ) -> ServiceResult<Asset> {
        let asset = Asset {
            id: new_id("cid"),
            name: name.to_string(),
            options,
            files: Vec::new(),
            created_at: Utc::now(),
        };
        self.state().assets.insert(asset.id.clone(), asset.clone());
        tracing::debug!(asset_id = %asset.id, name = %name, "Simulated asset created");
        Ok(asset)
    }

    async fn get_asset(&self, asset_id: &str) -> ServiceResult<Asset> {
        self.state()
            .assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("asset {}", asset_id)))
    }

    async fn create_asset_file(&self, asset_id: &str, name: &str) -> ServiceResult<AssetFile> {
        let mut state = self.state();
        let asset = state.asset_mut(asset_id)?;
        if asset.files.iter().any(|f| f.name == name) {
            return Err(ServiceError::Rejected(format!(
                "asset {} already has a file named {}",
                asset_id, name
            )));
        }
        let file = AssetFile {
            id: new_id("fid"),
            name: name.to_string(),
            size_bytes: 0,
            mime_type: mime_type_for(name),
            is_primary: false,
        };
        asset.files.push(file.clone());
        Ok(file)
    }

    async fn set_primary_file(&self, asset_id: &str, file_id: &str) -> ServiceResult<()> {
        let mut state = self.state();
        let asset = state.asset_mut(asset_id)?;
        if !asset.mark_primary(file_id) {
            return Err(ServiceError::NotFound(format!(
                "file {} in asset {}",
                file_id, asset_id
            )));
        }
        Ok(())
    }

    async fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permissions: &[AccessPermission],
    ) -> ServiceResult<AccessPolicy> {
        if duration.is_zero() {
            return Err(ServiceError::Rejected(
                "access policy duration must be positive".to_string(),
            ));
        }
        let policy = AccessPolicy {
            id: new_id("pid"),
            name: name.to_string(),
            duration_secs: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            permissions: permissions.to_vec(),
            created_at: Utc::now(),
        };
        self.state()
            .policies
            .insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    async fn create_locator(
        &self,
        kind: LocatorKind,
        asset_id: &str,
        policy: &AccessPolicy,
        start_time: Option<DateTime<Utc>>,
    ) -> ServiceResult<Locator> {
        let mut state = self.state();
        let policy = state
            .policies
            .get(&policy.id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("policy {}", policy.id)))?;
        state.asset_mut(asset_id)?;

        let locator_id = new_id("lid");
        let start_time = start_time.unwrap_or_else(Utc::now);
        let path = match kind {
            LocatorKind::Sas => format!(
                "{}/upload/{}?sig=simulated&se={}",
                SIMULATED_ORIGIN,
                asset_id.replace(':', "-"),
                Locator::expiration_for(&policy, start_time).timestamp()
            ),
            LocatorKind::OnDemandOrigin => {
                format!("{}/{}/", SIMULATED_ORIGIN, locator_id.replace(':', "-"))
            }
        };
        let locator = Locator {
            id: locator_id,
            kind,
            asset_id: asset_id.to_string(),
            policy_id: policy.id.clone(),
            path,
            start_time,
            expiration: Locator::expiration_for(&policy, start_time),
        };
        state.locators.insert(locator.id.clone(), locator.clone());
        state.locators_created.push(locator.clone());
        Ok(locator)
    }

    async fn delete_locator(&self, locator_id: &str) -> ServiceResult<()> {
        let mut state = self.state();
        if state.locators.remove(locator_id).is_none() {
            return Err(ServiceError::NotFound(format!("locator {}", locator_id)));
        }
        state.locators_deleted.push(locator_id.to_string());
        Ok(())
    }

    async fn transfer_file(
        &self,
        local_path: &Path,
        file: &AssetFile,
        locator: &Locator,
        concurrency: usize,
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> ServiceResult<u64> {
        if concurrency == 0 {
            return Err(ServiceError::Rejected(
                "transfer concurrency must be at least 1".to_string(),
            ));
        }
        let (asset_id, failure) = {
            let state = self.state();
            (state.check_write_locator(file, locator)?, state.transfer_failure.clone())
        };

        let mut source = tokio::fs::File::open(local_path).await?;
        let total_bytes = source.metadata().await?.len();
        let mut buffer = vec![0u8; SIMULATED_BLOCK_SIZE];
        let mut transferred = 0u64;

        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            transferred += read as u64;
            on_progress(TransferProgress {
                bytes_transferred: transferred,
                total_bytes,
            });
            if let Some(reason) = &failure {
                return Err(ServiceError::Transport(reason.clone()));
            }
        }

        let mut state = self.state();
        let asset = state.asset_mut(&asset_id)?;
        if let Some(stored) = asset.files.iter_mut().find(|f| f.id == file.id) {
            stored.size_bytes = transferred;
        }
        Ok(transferred)
    }

    async fn list_processors(&self, name: Option<&str>) -> ServiceResult<Vec<MediaProcessor>> {
        Ok(self
            .state()
            .processors
            .iter()
            .filter(|p| name.map_or(true, |n| p.name == n))
            .cloned()
            .collect())
    }

    async fn create_job(&self, name: &str) -> ServiceResult<Job> {
        let mut state = self.state();
        let job = Job {
            id: new_id("jid"),
            name: name.to_string(),
            state: JobState::Queued,
            progress: 0.0,
            tasks: Vec::new(),
            created_at: Utc::now(),
        };
        let script = state.job_script.clone();
        state.jobs.insert(
            job.id.clone(),
            SimJob {
                job: job.clone(),
                submitted: false,
                step: 0,
                script,
                polls: 0,
                outputs_materialized: false,
            },
        );
        Ok(job)
    }

    async fn add_task(&self, job_id: &str, spec: &TaskSpec) -> ServiceResult<Task> {
        let mut state = self.state();
        if !state.processors.iter().any(|p| p.id == spec.processor_id) {
            return Err(ServiceError::NotFound(format!(
                "processor {}",
                spec.processor_id
            )));
        }
        if !state.assets.contains_key(&spec.input_asset_id) {
            return Err(ServiceError::NotFound(format!(
                "asset {}",
                spec.input_asset_id
            )));
        }
        if state.sim_job_mut(job_id)?.submitted {
            return Err(ServiceError::Rejected(format!(
                "job {} is already submitted",
                job_id
            )));
        }

        let output = Asset {
            id: new_id("cid"),
            name: spec.output_asset_name.clone(),
            options: spec.output_options,
            files: Vec::new(),
            created_at: Utc::now(),
        };
        let task = Task {
            id: new_id("tid"),
            job_id: job_id.to_string(),
            name: spec.name.clone(),
            processor_id: spec.processor_id.clone(),
            profile: spec.profile.clone(),
            input_asset_id: spec.input_asset_id.clone(),
            output_asset_id: output.id.clone(),
        };
        state.assets.insert(output.id.clone(), output);
        state.sim_job_mut(job_id)?.job.tasks.push(task.clone());
        Ok(task)
    }

    async fn submit_job(&self, job_id: &str) -> ServiceResult<Job> {
        let mut state = self.state();
        let sim = state.sim_job_mut(job_id)?;
        if sim.submitted {
            return Err(ServiceError::Rejected(format!(
                "job {} is already submitted",
                job_id
            )));
        }
        if sim.job.tasks.is_empty() {
            return Err(ServiceError::Rejected(format!("job {} has no tasks", job_id)));
        }
        sim.submitted = true;
        sim.job.state = JobState::Queued;
        Ok(sim.job.clone())
    }

    async fn get_job(&self, job_id: &str) -> ServiceResult<JobSnapshot> {
        let mut state = self.state();
        let sim = state.sim_job_mut(job_id)?;
        if !sim.submitted {
            return Err(ServiceError::Rejected(format!(
                "job {} has not been submitted",
                job_id
            )));
        }
        sim.polls += 1;
        let step = match sim.script.get(sim.step).or_else(|| sim.script.last()) {
            Some(step) => step.clone(),
            None => ScriptStep::new(JobState::Finished, 100.0),
        };
        if sim.step + 1 < sim.script.len() {
            sim.step += 1;
        }
        sim.job.state = step.state;
        sim.job.progress = step.progress;

        if step.state == JobState::Finished {
            state.materialize_outputs(job_id);
        }

        Ok(JobSnapshot {
            job_id: job_id.to_string(),
            state: step.state,
            progress: step.progress,
            error_detail: step.error_detail,
        })
    }

    async fn get_reserved_units(
        &self,
        unit_type: ReservedUnitType,
    ) -> ServiceResult<Option<ReservedUnitSetting>> {
        let state = self.state();
        if !state.reserved_units_available {
            return Err(ServiceError::Transport(
                "reserved unit API unavailable".to_string(),
            ));
        }
        Ok(state.reserved_units.get(&unit_type).copied())
    }

    async fn set_reserved_units(
        &self,
        unit_type: ReservedUnitType,
        count: u32,
    ) -> ServiceResult<ReservedUnitSetting> {
        let mut state = self.state();
        if !state.reserved_units_available {
            return Err(ServiceError::Transport(
                "reserved unit API unavailable".to_string(),
            ));
        }
        let setting = ReservedUnitSetting {
            unit_type,
            current_units: count,
        };
        state.reserved_units.insert(unit_type, setting);
        Ok(setting)
    }

    async fn list_streaming_endpoints(&self) -> ServiceResult<Vec<StreamingEndpoint>> {
        Ok(self.state().endpoints.clone())
    }
}
