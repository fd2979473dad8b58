//! Error types module
//!
//! One error enum per component. Every failure coming back from the media
//! service is a [`ServiceError`]; components wrap it with the context of the
//! step that failed. Nothing here is retried: errors propagate to the caller
//! and abort the remaining workflow steps.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by (or while talking to) the media service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode service response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

/// Result type for media service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0} must be set")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Config validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Input file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Input file is empty: {}", path.display())]
    EmptyFile { path: PathBuf },

    #[error("Input path has no usable file name: {}", path.display())]
    InvalidFileName { path: PathBuf },

    #[error("Failed to read input file '{}': {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Transfer of '{file}' failed: {source}")]
    Transfer {
        file: String,
        #[source]
        source: ServiceError,
    },

    #[error("Failed to release write locator {locator_id}: {source}")]
    LocatorRelease {
        locator_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Upload setup failed: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("No media processor found matching '{name}'")]
    NoProcessorFound { name: String },

    #[error("Job submission rejected: {0}")]
    Rejected(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {job_id} failed: {detail}")]
    Failed { job_id: String, detail: String },

    #[error("Job {job_id} was canceled by the service")]
    RemoteCanceled { job_id: String },

    /// The local wait was stopped; the remote job keeps its own state.
    #[error("Stopped waiting for job {job_id}")]
    AwaitCanceled { job_id: String },

    #[error("Failed to poll job {job_id}: {source}")]
    Poll {
        job_id: String,
        #[source]
        source: ServiceError,
    },
}

impl JobError {
    pub fn job_id(&self) -> &str {
        match self {
            JobError::Failed { job_id, .. }
            | JobError::RemoteCanceled { job_id }
            | JobError::AwaitCanceled { job_id }
            | JobError::Poll { job_id, .. } => job_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("No '{extension}' manifest in asset {asset_id}")]
    ManifestNotFound { asset_id: String, extension: String },

    #[error("Locator request failed: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Invalid reserved unit count {count}: {reason}")]
    InvalidCount { count: i64, reason: String },

    #[error("Reserved unit request failed: {0}")]
    Service(#[from] ServiceError),
}

/// Top-level error for the end-to-end encode workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    #[error("Quota error: {0}")]
    Quota(#[from] QuotaError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_exposes_job_id() {
        let err = JobError::Failed {
            job_id: "job-7".to_string(),
            detail: "Unsupported codec".to_string(),
        };
        assert_eq!(err.job_id(), "job-7");
        assert_eq!(err.to_string(), "Job job-7 failed: Unsupported codec");
    }

    #[test]
    fn component_errors_convert_into_workflow_error() {
        let err: WorkflowError = SubmitError::NoProcessorFound {
            name: "Media Encoder Standard".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            WorkflowError::Submit(SubmitError::NoProcessorFound { .. })
        ));
    }
}
