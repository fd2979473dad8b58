//! Streaming URL resolution
//!
//! A playback URL is `<locator path><escaped manifest name>/manifest<qualifier>`.
//! The manifest is looked up in the asset handed in by the caller; the resolver
//! never searches the account for "some" asset.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use vidkit_client::MediaService;
use vidkit_core::models::{AccessPermission, Asset, AssetFile, LocatorKind};
use vidkit_core::{Config, LocatorError};

const STREAMING_POLICY_NAME: &str = "Streaming policy";

/// Characters escaped in the manifest file name. Reserved URI characters are
/// kept as-is except `#` and `?`, which would cut the path short.
const MANIFEST_NAME: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
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

/// Adaptive streaming format requested from the origin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamingFormat {
    /// Smooth Streaming, the origin's native format (no qualifier).
    Smooth,
    #[default]
    Hls,
    Dash,
    /// Raw qualifier appended verbatim, e.g. `(format=m3u8-aapl-v3)`.
    Custom(String),
}

impl StreamingFormat {
    pub fn qualifier(&self) -> &str {
        match self {
            StreamingFormat::Smooth => "",
            StreamingFormat::Hls => "(format=m3u8-aapl)",
            StreamingFormat::Dash => "(format=mpd-time-csf)",
            StreamingFormat::Custom(q) => q,
        }
    }
}

impl Display for StreamingFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StreamingFormat::Smooth => write!(f, "smooth"),
            StreamingFormat::Hls => write!(f, "hls"),
            StreamingFormat::Dash => write!(f, "dash"),
            StreamingFormat::Custom(q) => write!(f, "{}", q),
        }
    }
}

impl FromStr for StreamingFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smooth" | "ss" => Ok(StreamingFormat::Smooth),
            "hls" | "m3u8" => Ok(StreamingFormat::Hls),
            "dash" | "mpd" => Ok(StreamingFormat::Dash),
            _ if s.starts_with("(format=") && s.ends_with(')') => {
                Ok(StreamingFormat::Custom(s.to_string()))
            }
            _ => Err(anyhow::anyhow!(
                "Invalid streaming format: {}. Must be: hls, dash, smooth, or a (format=...) qualifier",
                s
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StreamingConfig {
    pub manifest_extension: String,
    pub locator_ttl: Duration,
    /// Locators start this far in the past.
    pub clock_skew: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            manifest_extension: ".ism".to_string(),
            locator_ttl: Duration::from_secs(90 * 24 * 3600),
            clock_skew: Duration::from_secs(5 * 60),
        }
    }
}

impl StreamingConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            manifest_extension: config.manifest_extension.clone(),
            locator_ttl: config.streaming_locator_ttl,
            clock_skew: config.clock_skew,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamingUrl {
    pub asset_id: String,
    pub manifest_name: String,
    pub locator_id: String,
    pub base_path: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// First file with `extension`. More than one match is logged and the first wins.
pub fn select_manifest<'a>(
    asset: &'a Asset,
    extension: &str,
) -> Result<&'a AssetFile, LocatorError> {
    let mut matches = asset.files_with_extension(extension);
    let first = matches.next().ok_or_else(|| LocatorError::ManifestNotFound {
        asset_id: asset.id.clone(),
        extension: extension.to_string(),
    })?;
    let others = matches.count();
    if others > 0 {
        tracing::warn!(
            asset_id = %asset.id,
            manifest = %first.name,
            ignored = others,
            "Asset has several manifests; using the first"
        );
    }
    Ok(first)
}

pub fn playback_url(base_path: &str, manifest_name: &str, format: &StreamingFormat) -> String {
    let separator = if base_path.ends_with('/') { "" } else { "/" };
    format!(
        "{}{}{}/manifest{}",
        base_path,
        separator,
        utf8_percent_encode(manifest_name, MANIFEST_NAME),
        format.qualifier()
    )
}

pub struct LocatorResolver {
    service: Arc<dyn MediaService>,
    config: StreamingConfig,
}

impl LocatorResolver {
    pub fn new(service: Arc<dyn MediaService>, config: StreamingConfig) -> Self {
        Self { service, config }
    }

    /// Mint a read-only origin locator for `asset` and build its playback URL.
    ///
    /// The manifest is checked before any policy or locator is created.
    #[tracing::instrument(skip(self, asset), fields(asset_id = %asset.id))]
    pub async fn resolve_streaming_url(
        &self,
        asset: &Asset,
        format: &StreamingFormat,
    ) -> Result<StreamingUrl, LocatorError> {
        let manifest = select_manifest(asset, &self.config.manifest_extension)?;

        let policy = self
            .service
            .create_access_policy(
                STREAMING_POLICY_NAME,
                self.config.locator_ttl,
                &[AccessPermission::Read],
            )
            .await?;

        let skew = chrono::Duration::from_std(self.config.clock_skew)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let start_time = Utc::now() - skew;
        let locator = self
            .service
            .create_locator(LocatorKind::OnDemandOrigin, &asset.id, &policy, Some(start_time))
            .await?;

        let url = playback_url(&locator.path, &manifest.name, format);
        tracing::info!(
            locator_id = %locator.id,
            manifest = %manifest.name,
            expires_at = %locator.expiration,
            "Streaming locator created"
        );

        Ok(StreamingUrl {
            asset_id: asset.id.clone(),
            manifest_name: manifest.name.clone(),
            locator_id: locator.id,
            base_path: locator.path,
            url,
            expires_at: locator.expiration,
        })
    }

    /// Fetch the asset's current file list, then resolve.
    pub async fn resolve_for_asset_id(
        &self,
        asset_id: &str,
        format: &StreamingFormat,
    ) -> Result<StreamingUrl, LocatorError> {
        let asset = self.service.get_asset(asset_id).await?;
        self.resolve_streaming_url(&asset, format).await
    }
}
