//! vidkit core library
//!
//! Domain models, error types and configuration shared by the service
//! client, the orchestration layer and the CLI.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{AccountCredentials, Config};
pub use error::{
    ConfigError, JobError, LocatorError, QuotaError, ServiceError, ServiceResult, SubmitError,
    UploadError, WorkflowError,
};
