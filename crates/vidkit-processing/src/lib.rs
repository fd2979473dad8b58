//! Orchestration of the vidkit encode workflow on top of a [`vidkit_client::MediaService`].
//!
//! Each component owns one step (upload, job, locator, quota) and takes its
//! settings explicitly; [`EncodeWorkflow`] runs them in sequence.

pub mod job;
pub mod locator;
pub mod quota;
pub mod upload;
pub mod workflow;

pub use job::{
    highest_version, CompletedJob, EncodingRequest, JobConfig, JobHandle, JobOrchestrator,
    JobProgress,
};
pub use locator::{
    playback_url, select_manifest, LocatorResolver, StreamingConfig, StreamingFormat,
    StreamingUrl,
};
pub use quota::{QuotaController, UNKNOWN_UNITS};
pub use upload::{UploadConfig, UploadCoordinator, UploadedFile};
pub use workflow::{
    asset_name_for, EncodeWorkflow, WorkflowEvent, WorkflowReport, WorkflowRequest,
};
