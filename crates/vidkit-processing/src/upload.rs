//! Upload coordination: local file → asset file through a short-lived write locator.
//!
//! The write locator is held by a [`WriteLocatorLease`] and released exactly
//! once on every exit path: explicitly after the transfer, or from `Drop` if
//! the upload future is abandoned midway.

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vidkit_client::{MediaService, TransferProgress};
use vidkit_core::models::{AccessPermission, Asset, AssetFile, Locator, LocatorKind};
use vidkit_core::{Config, ServiceResult, UploadError};

const WRITE_POLICY_NAME: &str = "Write";

#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Concurrent block transfers (>= 1).
    pub concurrency: usize,
    pub write_locator_ttl: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            write_locator_ttl: Duration::from_secs(3600),
        }
    }
}

impl UploadConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.upload_concurrency.max(1),
            write_locator_ttl: config.write_locator_ttl,
        }
    }
}

/// A file that landed in its asset and was flagged primary.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub asset_id: String,
    pub file: AssetFile,
    pub bytes_transferred: u64,
}

/// Write locator that is deleted exactly once.
struct WriteLocatorLease {
    service: Arc<dyn MediaService>,
    locator: Option<Locator>,
}

impl WriteLocatorLease {
    async fn release(mut self) -> Result<(), (String, vidkit_core::ServiceError)> {
        let Some(locator) = self.locator.take() else {
            return Ok(());
        };
        match self.service.delete_locator(&locator.id).await {
            Ok(()) => {
                tracing::debug!(locator_id = %locator.id, "Write locator released");
                Ok(())
            }
            Err(e) => Err((locator.id, e)),
        }
    }
}

impl Drop for WriteLocatorLease {
    fn drop(&mut self) {
        let Some(locator) = self.locator.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let service = Arc::clone(&self.service);
                handle.spawn(async move {
                    if let Err(e) = service.delete_locator(&locator.id).await {
                        tracing::warn!(
                            locator_id = %locator.id,
                            error = %e,
                            "Failed to release abandoned write locator"
                        );
                    }
                });
            }
            Err(_) => tracing::warn!(
                locator_id = %locator.id,
                "No runtime to release abandoned write locator; it expires with its policy"
            ),
        }
    }
}

/// Pushes local files into assets.
pub struct UploadCoordinator {
    service: Arc<dyn MediaService>,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(service: Arc<dyn MediaService>, config: UploadConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `local_path` into `asset` as a file named after the path's base
    /// name, then flag it primary.
    ///
    /// `on_progress` receives the completed percentage; values never go
    /// backwards. No retries: a failed transfer is returned as-is.
    #[tracing::instrument(skip(self, asset, on_progress), fields(asset_id = %asset.id))]
    pub async fn upload<F>(
        &self,
        local_path: &Path,
        asset: &Asset,
        on_progress: F,
    ) -> Result<UploadedFile, UploadError>
    where
        F: Fn(f64) + Send + Sync,
    {
        let file_name = validate_input(local_path).await?;

        let file = self
            .service
            .create_asset_file(&asset.id, &file_name)
            .await?;
        tracing::info!(file_id = %file.id, file = %file.name, "Created asset file");

        let policy = self
            .service
            .create_access_policy(
                WRITE_POLICY_NAME,
                self.config.write_locator_ttl,
                &[AccessPermission::Write],
            )
            .await?;
        let locator = self
            .service
            .create_locator(LocatorKind::Sas, &asset.id, &policy, None)
            .await?;
        let lease = WriteLocatorLease {
            service: Arc::clone(&self.service),
            locator: Some(locator.clone()),
        };

        let transfer = self
            .transfer(local_path, &file, &locator, &on_progress)
            .await;
        let release = lease.release().await;

        let bytes_transferred = match (transfer, release) {
            (Ok(bytes), Ok(())) => bytes,
            (Ok(_), Err((locator_id, source))) => {
                return Err(UploadError::LocatorRelease { locator_id, source });
            }
            (Err(source), release) => {
                if let Err((locator_id, e)) = release {
                    tracing::warn!(
                        locator_id = %locator_id,
                        error = %e,
                        "Failed to release write locator after failed transfer"
                    );
                }
                return Err(UploadError::Transfer {
                    file: file.name,
                    source,
                });
            }
        };

        self.service.set_primary_file(&asset.id, &file.id).await?;

        tracing::info!(
            file = %file.name,
            bytes = bytes_transferred,
            "Upload finished"
        );

        Ok(UploadedFile {
            asset_id: asset.id.clone(),
            file: AssetFile {
                size_bytes: bytes_transferred,
                is_primary: true,
                ..file
            },
            bytes_transferred,
        })
    }

    async fn transfer<F>(
        &self,
        local_path: &Path,
        file: &AssetFile,
        locator: &Locator,
        on_progress: &F,
    ) -> ServiceResult<u64>
    where
        F: Fn(f64) + Send + Sync,
    {
        let highest = Mutex::new(f64::MIN);
        let report = |progress: TransferProgress| {
            let percent = progress.percent();
            let forward = match highest.lock() {
                Ok(mut last) if percent >= *last => {
                    *last = percent;
                    true
                }
                _ => false,
            };
            if forward {
                on_progress(percent);
            }
        };

        self.service
            .transfer_file(
                local_path,
                file,
                locator,
                self.config.concurrency,
                &report,
            )
            .await
    }
}

/// The input must be an existing, non-empty regular file with a UTF-8 base name.
async fn validate_input(local_path: &Path) -> Result<String, UploadError> {
    let metadata = match tokio::fs::metadata(local_path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::FileNotFound {
                path: local_path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(UploadError::ReadFile {
                path: local_path.to_path_buf(),
                source,
            });
        }
    };
    if !metadata.is_file() {
        return Err(UploadError::FileNotFound {
            path: local_path.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(UploadError::EmptyFile {
            path: local_path.to_path_buf(),
        });
    }
    local_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| UploadError::InvalidFileName {
            path: local_path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vidkit_client::InMemoryMediaService;
    use vidkit_core::models::AssetCreationOptions;

    fn coordinator(service: Arc<InMemoryMediaService>) -> UploadCoordinator {
        UploadCoordinator::new(service, UploadConfig::default())
    }

    fn input_file(name: &str, bytes: usize) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![1u8; bytes]).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn upload_marks_primary_and_releases_locator() {
        let service = Arc::new(InMemoryMediaService::new());
        let asset = service
            .create_asset("Bitten by the Frost", AssetCreationOptions::None)
            .await
            .unwrap();
        let (_dir, path) = input_file("frost.mp4", 300 * 1024);

        let seen = Mutex::new(Vec::new());
        let uploaded = coordinator(service.clone())
            .upload(&path, &asset, |p| seen.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(uploaded.file.name, "frost.mp4");
        assert_eq!(uploaded.bytes_transferred, 300 * 1024);

        let stored = service.get_asset(&asset.id).await.unwrap();
        assert_eq!(stored.primary_file().map(|f| f.name.as_str()), Some("frost.mp4"));

        let created = service.created_locators();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, LocatorKind::Sas);
        assert_eq!(service.deleted_locators(), vec![created[0].id.clone()]);
        assert!(service.active_locators().is_empty());

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn failed_transfer_still_releases_locator_once() {
        let service =
            Arc::new(InMemoryMediaService::new().with_transfer_failure("connection reset"));
        let asset = service
            .create_asset("clip", AssetCreationOptions::None)
            .await
            .unwrap();
        let (_dir, path) = input_file("clip.mp4", 1024);

        let err = coordinator(service.clone())
            .upload(&path, &asset, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transfer { .. }));
        assert_eq!(service.created_locators().len(), 1);
        assert_eq!(service.deleted_locators().len(), 1);
        let stored = service.get_asset(&asset.id).await.unwrap();
        assert!(stored.primary_file().is_none());
    }

    #[tokio::test]
    async fn missing_file_fails_before_touching_the_service() {
        let service = Arc::new(InMemoryMediaService::new());
        let asset = service
            .create_asset("clip", AssetCreationOptions::None)
            .await
            .unwrap();

        let err = coordinator(service.clone())
            .upload(Path::new("/definitely/not/here.mp4"), &asset, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::FileNotFound { .. }));
        assert!(service.created_locators().is_empty());
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let service = Arc::new(InMemoryMediaService::new());
        let asset = service
            .create_asset("clip", AssetCreationOptions::None)
            .await
            .unwrap();
        let (_dir, path) = input_file("empty.mp4", 0);

        let err = coordinator(service.clone())
            .upload(&path, &asset, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::EmptyFile { .. }));
        assert!(service.created_locators().is_empty());
    }

    #[tokio::test]
    async fn upload_into_unknown_asset_is_a_service_error() {
        let service = Arc::new(InMemoryMediaService::new());
        let mut asset = service
            .create_asset("clip", AssetCreationOptions::None)
            .await
            .unwrap();
        asset.id = "nb:cid:UUID:missing".to_string();
        let (_dir, path) = input_file("clip.mp4", 16);

        let err = coordinator(service.clone())
            .upload(&path, &asset, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Service(_)));
        assert!(service.created_locators().is_empty());
    }
}
