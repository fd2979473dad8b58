//! vidkit media service client
//!
//! [`MediaService`] is the only boundary between the orchestration layer and
//! the cloud provider. Two implementations ship with the crate:
//!
//! - [`HttpMediaService`]: talks to the provider's REST API.
//! - [`InMemoryMediaService`]: deterministic simulation for tests and dry runs.

pub mod http;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use http::HttpMediaService;
pub use memory::{default_job_script, InMemoryMediaService, ScriptStep};
pub use traits::{MediaService, TransferProgress};
