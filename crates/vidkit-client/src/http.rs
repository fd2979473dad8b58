//! HTTP adapter for a media service REST API.
//!
//! JSON over HTTPS with account name/key headers. Uploads bypass the API and
//! go straight to the write locator's URL: the file is split into blocks that
//! are PUT in parallel, then the block list is committed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, CONTROLS};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use vidkit_core::models::{
    AccessPermission, AccessPolicy, Asset, AssetCreationOptions, AssetFile, Job, JobSnapshot,
    Locator, LocatorKind, MediaProcessor, ReservedUnitSetting, ReservedUnitType,
    StreamingEndpoint, Task, TaskSpec,
};
use vidkit_core::{AccountCredentials, ServiceError, ServiceResult};

use crate::traits::{MediaService, TransferProgress};

const ACCOUNT_NAME_HEADER: &str = "X-Account-Name";
const ACCOUNT_KEY_HEADER: &str = "X-Account-Key";

/// Characters escaped in an id placed in a single path segment. `:` is kept,
/// provider ids look like `nb:cid:UUID:...`.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Serialize)]
struct CreateAssetRequest<'a> {
    name: &'a str,
    options: AssetCreationOptions,
}

#[derive(Serialize)]
struct CreateFileRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CreatePolicyRequest<'a> {
    name: &'a str,
    duration_secs: i64,
    permissions: &'a [AccessPermission],
}

#[derive(Serialize)]
struct CreateLocatorRequest<'a> {
    kind: LocatorKind,
    asset_id: &'a str,
    policy_id: &'a str,
    start_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct CreateJobRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct SetReservedUnitsRequest {
    current_units: u32,
}

#[derive(Serialize)]
struct BlockList {
    blocks: Vec<String>,
}

/// [`MediaService`] backed by the provider's REST API.
#[derive(Clone, Debug)]
pub struct HttpMediaService {
    client: Client,
    base_url: String,
    credentials: AccountCredentials,
    block_size: usize,
}

impl HttpMediaService {
    pub fn new(
        base_url: &str,
        credentials: AccountCredentials,
        timeout: Duration,
        block_size: usize,
    ) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            block_size: block_size.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(ACCOUNT_NAME_HEADER, self.credentials.account_name.as_str())
            .header(ACCOUNT_KEY_HEADER, self.credentials.account_key.as_str())
    }

    async fn send(&self, request: RequestBuilder) -> ServiceResult<Response> {
        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        check_status(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ServiceResult<T> {
        let mut request = self.client.get(self.build_url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        decode(self.send(request).await?).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        let request = self.client.post(self.build_url(path)).json(body);
        decode(self.send(request).await?).await
    }

    async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        let request = self.client.put(self.build_url(path)).json(body);
        decode(self.send(request).await?).await
    }

    async fn delete(&self, path: &str) -> ServiceResult<()> {
        self.send(self.client.delete(self.build_url(path))).await?;
        Ok(())
    }

    /// Blob URL for `file_name` under a SAS locator path
    /// (`https://host/container?sig=...` → `https://host/container/<file>?sig=...`).
    fn blob_url(locator: &Locator, file_name: &str) -> ServiceResult<Url> {
        let mut url = Url::parse(&locator.path)
            .map_err(|e| ServiceError::Rejected(format!("Invalid locator path: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Rejected("Locator path cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(file_name);
        Ok(url)
    }

    async fn put_block(&self, blob_url: &Url, block_id: &str, data: Bytes) -> ServiceResult<u64> {
        let len = data.len() as u64;
        let response = self
            .client
            .put(blob_url.clone())
            .query(&[("comp", "block"), ("blockid", block_id)])
            .body(data)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        check_status(response).await?;
        Ok(len)
    }
}

/// Equal-length, base64 block ids so the service can order them.
fn block_id(index: u64) -> String {
    STANDARD.encode(format!("block-{:08}", index))
}

async fn read_block(path: &Path, offset: u64, len: usize) -> ServiceResult<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

async fn check_status(response: Response) -> ServiceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status == StatusCode::NOT_FOUND {
        return Err(ServiceError::NotFound(message));
    }
    Err(ServiceError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> ServiceResult<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| ServiceError::Transport(e.to_string()))?;
    Ok(serde_json::from_slice(&body)?)
}

fn segment(id: &str) -> PercentEncode<'_> {
    utf8_percent_encode(id, PATH_SEGMENT)
}

#[async_trait]
impl MediaService for HttpMediaService {
    async fn create_asset(
        &self,
        name: &str,
        options: AssetCreationOptions,
    ) -> ServiceResult<Asset> {
        self.post_json("/assets", &CreateAssetRequest { name, options })
            .await
    }

    async fn get_asset(&self, asset_id: &str) -> ServiceResult<Asset> {
        self.get(&format!("/assets/{}", segment(asset_id)), &[])
            .await
    }

    async fn create_asset_file(&self, asset_id: &str, name: &str) -> ServiceResult<AssetFile> {
        self.post_json(
            &format!("/assets/{}/files", segment(asset_id)),
            &CreateFileRequest { name },
        )
        .await
    }

    async fn set_primary_file(&self, asset_id: &str, file_id: &str) -> ServiceResult<()> {
        let path = format!(
            "/assets/{}/files/{}/primary",
            segment(asset_id),
            segment(file_id)
        );
        self.send(self.client.put(self.build_url(&path))).await?;
        Ok(())
    }

    async fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permissions: &[AccessPermission],
    ) -> ServiceResult<AccessPolicy> {
        self.post_json(
            "/access-policies",
            &CreatePolicyRequest {
                name,
                duration_secs: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
                permissions,
            },
        )
        .await
    }

    async fn create_locator(
        &self,
        kind: LocatorKind,
        asset_id: &str,
        policy: &AccessPolicy,
        start_time: Option<DateTime<Utc>>,
    ) -> ServiceResult<Locator> {
        self.post_json(
            "/locators",
            &CreateLocatorRequest {
                kind,
                asset_id,
                policy_id: &policy.id,
                start_time,
            },
        )
        .await
    }

    async fn delete_locator(&self, locator_id: &str) -> ServiceResult<()> {
        self.delete(&format!("/locators/{}", segment(locator_id)))
            .await
    }

    async fn transfer_file(
        &self,
        local_path: &Path,
        file: &AssetFile,
        locator: &Locator,
        concurrency: usize,
        on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> ServiceResult<u64> {
        let total_bytes = tokio::fs::metadata(local_path).await?.len();
        let blob_url = Self::blob_url(locator, &file.name)?;
        let block_size = self.block_size as u64;
        let block_count = total_bytes.div_ceil(block_size);

        tracing::debug!(
            file = %file.name,
            total_bytes,
            block_count,
            concurrency,
            "Starting block transfer"
        );

        let mut transferred = 0u64;
        let mut blocks = stream::iter(0..block_count)
            .map(|index| {
                let blob_url = &blob_url;
                async move {
                    let offset = index * block_size;
                    let len = block_size.min(total_bytes - offset) as usize;
                    let data = read_block(local_path, offset, len).await?;
                    self.put_block(blob_url, &block_id(index), data).await
                }
            })
            .buffer_unordered(concurrency.max(1));

        while let Some(sent) = blocks.try_next().await? {
            transferred += sent;
            on_progress(TransferProgress {
                bytes_transferred: transferred,
                total_bytes,
            });
        }

        let commit = BlockList {
            blocks: (0..block_count).map(block_id).collect(),
        };
        let response = self
            .client
            .put(blob_url.clone())
            .query(&[("comp", "blocklist")])
            .json(&commit)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        check_status(response).await?;

        Ok(transferred)
    }

    async fn list_processors(&self, name: Option<&str>) -> ServiceResult<Vec<MediaProcessor>> {
        match name {
            Some(name) => self.get("/processors", &[("name", name)]).await,
            None => self.get("/processors", &[]).await,
        }
    }

    async fn create_job(&self, name: &str) -> ServiceResult<Job> {
        self.post_json("/jobs", &CreateJobRequest { name }).await
    }

    async fn add_task(&self, job_id: &str, spec: &TaskSpec) -> ServiceResult<Task> {
        self.post_json(&format!("/jobs/{}/tasks", segment(job_id)), spec)
            .await
    }

    async fn submit_job(&self, job_id: &str) -> ServiceResult<Job> {
        let path = format!("/jobs/{}/submit", segment(job_id));
        decode(self.send(self.client.post(self.build_url(&path))).await?).await
    }

    async fn get_job(&self, job_id: &str) -> ServiceResult<JobSnapshot> {
        self.get(&format!("/jobs/{}", segment(job_id)), &[])
            .await
    }

    async fn get_reserved_units(
        &self,
        unit_type: ReservedUnitType,
    ) -> ServiceResult<Option<ReservedUnitSetting>> {
        match self
            .get::<ReservedUnitSetting>(&format!("/reserved-units/{}", unit_type), &[])
            .await
        {
            Ok(setting) => Ok(Some(setting)),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_reserved_units(
        &self,
        unit_type: ReservedUnitType,
        count: u32,
    ) -> ServiceResult<ReservedUnitSetting> {
        self.put_json(
            &format!("/reserved-units/{}", unit_type),
            &SetReservedUnitsRequest {
                current_units: count,
            },
        )
        .await
    }

    async fn list_streaming_endpoints(&self) -> ServiceResult<Vec<StreamingEndpoint>> {
        self.get("/streaming-endpoints", &[]).await
    }
}
