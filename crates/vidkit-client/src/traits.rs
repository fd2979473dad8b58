//! Media service abstraction
//!
//! The cloud provider owns assets, jobs, locators and quotas. Everything the
//! orchestration layer needs from it goes through [`MediaService`], so the
//! HTTP adapter and the in-memory simulation are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

use vidkit_core::models::{
    AccessPermission, AccessPolicy, Asset, AssetCreationOptions, AssetFile, Job, JobSnapshot,
    Locator, LocatorKind, MediaProcessor, ReservedUnitSetting, ReservedUnitType,
    StreamingEndpoint, Task, TaskSpec,
};
use vidkit_core::ServiceResult;

/// Progress of a single file transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

/// Capability set of the remote media-processing service.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Create an empty asset.
    async fn create_asset(&self, name: &str, options: AssetCreationOptions)
        -> ServiceResult<Asset>;

    /// Fetch an asset with its current file list.
    async fn get_asset(&self, asset_id: &str) -> ServiceResult<Asset>;

    /// Create a file record under an asset. Bytes are transferred separately.
    async fn create_asset_file(&self, asset_id: &str, name: &str) -> ServiceResult<AssetFile>;

    /// Flag a file as the asset's primary file.
    async fn set_primary_file(&self, asset_id: &str, file_id: &str) -> ServiceResult<()>;

    async fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permissions: &[AccessPermission],
    ) -> ServiceResult<AccessPolicy>;

    /// Create a locator for `asset_id` under `policy`. `start_time` of `None`
    /// means "active immediately".
    async fn create_locator(
        &self,
        kind: LocatorKind,
        asset_id: &str,
        policy: &AccessPolicy,
        start_time: Option<DateTime<Utc>>,
    ) -> ServiceResult<Locator>;

    async fn delete_locator(&self, locator_id: &str) -> ServiceResult<()>;

    /// Push a local file's bytes into `file` through a write locator, with up
    /// to `concurrency` transfers in flight. Returns the number of bytes sent.
    async fn transfer_file(
        &self,
        local_path: &Path,
        file: &AssetFile,
        locator: &Locator,
        concurrency: usize,
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> ServiceResult<u64>;

    /// List processors, optionally restricted to an exact name.
    async fn list_processors(&self, name: Option<&str>) -> ServiceResult<Vec<MediaProcessor>>;

    /// Declare a new, unsubmitted job.
    async fn create_job(&self, name: &str) -> ServiceResult<Job>;

    /// Attach a task to an unsubmitted job. The service creates the task's
    /// empty output asset as part of this call.
    async fn add_task(&self, job_id: &str, spec: &TaskSpec) -> ServiceResult<Task>;

    async fn submit_job(&self, job_id: &str) -> ServiceResult<Job>;

    /// Current state and overall progress of a submitted job.
    async fn get_job(&self, job_id: &str) -> ServiceResult<JobSnapshot>;

    /// `Ok(None)` when the account has no reserved unit record for the tier.
    async fn get_reserved_units(
        &self,
        unit_type: ReservedUnitType,
    ) -> ServiceResult<Option<ReservedUnitSetting>>;

    async fn set_reserved_units(
        &self,
        unit_type: ReservedUnitType,
        count: u32,
    ) -> ServiceResult<ReservedUnitSetting>;

    async fn list_streaming_endpoints(&self) -> ServiceResult<Vec<StreamingEndpoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_partial_transfer() {
        let p = TransferProgress {
            bytes_transferred: 25,
            total_bytes: 100,
        };
        assert_eq!(p.percent(), 25.0);
    }

    #[test]
    fn percent_of_empty_transfer_is_complete() {
        let p = TransferProgress {
            bytes_transferred: 0,
            total_bytes: 0,
        };
        assert_eq!(p.percent(), 100.0);
    }
}
