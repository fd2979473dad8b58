//! Configuration module
//!
//! All settings come from `VIDKIT_*` environment variables (a `.env` file is
//! loaded by the binary). The resulting [`Config`] is passed explicitly to each
//! component; there is no process-wide context object.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

const API_URL: &str = "http://localhost:8080";
const HTTP_TIMEOUT_SECS: u64 = 60;
const UPLOAD_CONCURRENCY: usize = 5;
const UPLOAD_BLOCK_SIZE_KB: usize = 4096;
const WRITE_LOCATOR_TTL_MINUTES: u64 = 60;
const STREAMING_LOCATOR_TTL_DAYS: u64 = 90;
const CLOCK_SKEW_MINUTES: u64 = 5;
const POLL_INTERVAL_MS: u64 = 2000;
const PROGRESS_PRECISION: u32 = 2;
const ENCODER_NAME: &str = "Media Encoder Standard";
const ENCODING_PROFILE: &str = "H264 Multiple Bitrate 16x9 SD";
const MANIFEST_EXTENSION: &str = ".ism";

const SECS_PER_DAY: u64 = 24 * 3600;
/// Upper bound for either locator TTL (about a century).
const MAX_LOCATOR_TTL: Duration = Duration::from_secs(36_500 * SECS_PER_DAY);
/// Largest block the storage service accepts in one PUT.
const MAX_UPLOAD_BLOCK_SIZE_BYTES: usize = 4000 * 1024 * 1024;

/// Media service account name and key.
#[derive(Clone)]
pub struct AccountCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Option<AccountCredentials>,
    pub api_url: String,
    pub http_timeout: Duration,
    /// Concurrent block transfers per upload (>= 1).
    pub upload_concurrency: usize,
    pub upload_block_size_bytes: usize,
    pub write_locator_ttl: Duration,
    pub streaming_locator_ttl: Duration,
    /// How far streaming locators are backdated to absorb client/service clock drift.
    pub clock_skew: Duration,
    pub poll_interval: Duration,
    /// Decimal places job progress is rounded to before it is reported.
    pub progress_precision: u32,
    pub encoder_name: String,
    pub encoding_profile: String,
    pub manifest_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: None,
            api_url: API_URL.to_string(),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            upload_concurrency: UPLOAD_CONCURRENCY,
            upload_block_size_bytes: UPLOAD_BLOCK_SIZE_KB * 1024,
            write_locator_ttl: Duration::from_secs(WRITE_LOCATOR_TTL_MINUTES * 60),
            streaming_locator_ttl: Duration::from_secs(STREAMING_LOCATOR_TTL_DAYS * SECS_PER_DAY),
            clock_skew: Duration::from_secs(CLOCK_SKEW_MINUTES * 60),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            progress_precision: PROGRESS_PRECISION,
            encoder_name: ENCODER_NAME.to_string(),
            encoding_profile: ENCODING_PROFILE.to_string(),
            manifest_extension: MANIFEST_EXTENSION.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = match (var("VIDKIT_ACCOUNT_NAME"), var("VIDKIT_ACCOUNT_KEY")) {
            (Some(account_name), Some(account_key)) => Some(AccountCredentials {
                account_name,
                account_key,
            }),
            (Some(_), None) => return Err(ConfigError::Missing("VIDKIT_ACCOUNT_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("VIDKIT_ACCOUNT_NAME")),
            (None, None) => None,
        };

        let parse = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            parse_var(key, var(key), default)
        };
        let minutes = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            let value = parse(key, default)?;
            let secs = value.checked_mul(60).ok_or_else(|| too_large(key, value))?;
            Ok(Duration::from_secs(secs))
        };

        let block_size_kb = "VIDKIT_UPLOAD_BLOCK_SIZE_KB";
        let block_kb: usize = parse_var(block_size_kb, var(block_size_kb), UPLOAD_BLOCK_SIZE_KB)?;
        let ttl_days = "VIDKIT_STREAMING_LOCATOR_TTL_DAYS";
        let streaming_days = parse(ttl_days, STREAMING_LOCATOR_TTL_DAYS)?;

        let config = Config {
            credentials,
            api_url: var("VIDKIT_API_URL")
                .unwrap_or_else(|| API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            http_timeout: Duration::from_secs(parse(
                "VIDKIT_HTTP_TIMEOUT_SECS",
                HTTP_TIMEOUT_SECS,
            )?),
            upload_concurrency: parse_var(
                "VIDKIT_UPLOAD_CONCURRENCY",
                var("VIDKIT_UPLOAD_CONCURRENCY"),
                UPLOAD_CONCURRENCY,
            )?,
            upload_block_size_bytes: block_kb
                .checked_mul(1024)
                .ok_or_else(|| too_large(block_size_kb, block_kb))?,
            write_locator_ttl: minutes(
                "VIDKIT_WRITE_LOCATOR_TTL_MINUTES",
                WRITE_LOCATOR_TTL_MINUTES,
            )?,
            streaming_locator_ttl: Duration::from_secs(
                streaming_days
                    .checked_mul(SECS_PER_DAY)
                    .ok_or_else(|| too_large(ttl_days, streaming_days))?,
            ),
            clock_skew: minutes("VIDKIT_CLOCK_SKEW_MINUTES", CLOCK_SKEW_MINUTES)?,
            poll_interval: Duration::from_millis(parse(
                "VIDKIT_POLL_INTERVAL_MS",
                POLL_INTERVAL_MS,
            )?),
            progress_precision: parse_var(
                "VIDKIT_PROGRESS_PRECISION",
                var("VIDKIT_PROGRESS_PRECISION"),
                PROGRESS_PRECISION,
            )?,
            encoder_name: var("VIDKIT_ENCODER_NAME").unwrap_or_else(|| ENCODER_NAME.to_string()),
            encoding_profile: var("VIDKIT_ENCODING_PROFILE")
                .unwrap_or_else(|| ENCODING_PROFILE.to_string()),
            manifest_extension: var("VIDKIT_MANIFEST_EXTENSION")
                .unwrap_or_else(|| MANIFEST_EXTENSION.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_concurrency == 0 {
            return Err(ConfigError::Validation(
                "VIDKIT_UPLOAD_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.upload_block_size_bytes == 0 {
            return Err(ConfigError::Validation(
                "VIDKIT_UPLOAD_BLOCK_SIZE_KB must be at least 1".to_string(),
            ));
        }
        if self.upload_block_size_bytes > MAX_UPLOAD_BLOCK_SIZE_BYTES {
            return Err(ConfigError::Validation(format!(
                "VIDKIT_UPLOAD_BLOCK_SIZE_KB must be at most {}",
                MAX_UPLOAD_BLOCK_SIZE_BYTES / 1024
            )));
        }
        if self.write_locator_ttl.is_zero() || self.streaming_locator_ttl.is_zero() {
            return Err(ConfigError::Validation(
                "Locator TTLs must be greater than zero".to_string(),
            ));
        }
        if self.write_locator_ttl > MAX_LOCATOR_TTL || self.streaming_locator_ttl > MAX_LOCATOR_TTL
        {
            return Err(ConfigError::Validation(format!(
                "Locator TTLs must be at most {} days",
                MAX_LOCATOR_TTL.as_secs() / SECS_PER_DAY
            )));
        }
        if self.clock_skew >= self.streaming_locator_ttl {
            return Err(ConfigError::Validation(
                "VIDKIT_CLOCK_SKEW_MINUTES must be shorter than the streaming locator TTL"
                    .to_string(),
            ));
        }
        if self.progress_precision > 6 {
            return Err(ConfigError::Validation(
                "VIDKIT_PROGRESS_PRECISION must be between 0 and 6".to_string(),
            ));
        }
        if !self.manifest_extension.starts_with('.') || self.manifest_extension.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "VIDKIT_MANIFEST_EXTENSION must look like '.ism', got '{}'",
                self.manifest_extension
            )));
        }
        if self.encoder_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "VIDKIT_ENCODER_NAME must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Credentials, or an error naming the missing variable.
    pub fn require_credentials(&self) -> Result<&AccountCredentials, ConfigError> {
        self.credentials
            .as_ref()
            .ok_or(ConfigError::Missing("VIDKIT_ACCOUNT_NAME and VIDKIT_ACCOUNT_KEY"))
    }
}

fn parse_var<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}

fn too_large(key: &'static str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: "value is too large".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_reference_workflow() {
        let config = from_map(&[]).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.upload_concurrency, 5);
        assert_eq!(config.write_locator_ttl, Duration::from_secs(3600));
        assert_eq!(config.streaming_locator_ttl, Duration::from_secs(90 * 24 * 3600));
        assert_eq!(config.clock_skew, Duration::from_secs(300));
        assert_eq!(config.progress_precision, 2);
        assert_eq!(config.encoder_name, "Media Encoder Standard");
        assert_eq!(config.manifest_extension, ".ism");
    }

    #[test]
    fn credentials_require_both_halves() {
        let err = from_map(&[("VIDKIT_ACCOUNT_NAME", "acct")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VIDKIT_ACCOUNT_KEY")));

        let config = from_map(&[
            ("VIDKIT_ACCOUNT_NAME", "acct"),
            ("VIDKIT_ACCOUNT_KEY", "secret"),
        ])
        .unwrap();
        let creds = config.require_credentials().unwrap();
        assert_eq!(creds.account_name, "acct");
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let config = from_map(&[]).unwrap();
        assert!(matches!(
            config.require_credentials(),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = from_map(&[("VIDKIT_UPLOAD_CONCURRENCY", "five")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "VIDKIT_UPLOAD_CONCURRENCY",
                ..
            }
        ));
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let err = from_map(&[("VIDKIT_UPLOAD_CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn manifest_extension_must_start_with_dot() {
        let err = from_map(&[("VIDKIT_MANIFEST_EXTENSION", "ism")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn api_url_trailing_slash_is_trimmed() {
        let config = from_map(&[("VIDKIT_API_URL", "https://media.example.com/api/")]).unwrap();
        assert_eq!(config.api_url, "https://media.example.com/api");
    }

    #[test]
    fn overflowing_ttl_is_rejected_not_wrapped() {
        let err =
            from_map(&[("VIDKIT_STREAMING_LOCATOR_TTL_DAYS", "300000000000000")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "VIDKIT_STREAMING_LOCATOR_TTL_DAYS",
                ..
            }
        ));

        let too_many = u64::MAX.to_string();
        let err = from_map(&[("VIDKIT_WRITE_LOCATOR_TTL_MINUTES", too_many.as_str())]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "VIDKIT_WRITE_LOCATOR_TTL_MINUTES",
                ..
            }
        ));
    }

    #[test]
    fn ttl_beyond_a_century_fails_validation() {
        let err = from_map(&[("VIDKIT_STREAMING_LOCATOR_TTL_DAYS", "1000000000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let config = from_map(&[("VIDKIT_STREAMING_LOCATOR_TTL_DAYS", "36500")]).unwrap();
        assert_eq!(config.streaming_locator_ttl, MAX_LOCATOR_TTL);
    }

    #[test]
    fn oversized_block_size_is_rejected() {
        let too_many = u64::MAX.to_string();
        let err = from_map(&[("VIDKIT_UPLOAD_BLOCK_SIZE_KB", too_many.as_str())]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "VIDKIT_UPLOAD_BLOCK_SIZE_KB",
                ..
            }
        ));

        let err = from_map(&[("VIDKIT_UPLOAD_BLOCK_SIZE_KB", "4096001")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn out_of_range_precision_is_not_truncated() {
        let err = from_map(&[("VIDKIT_PROGRESS_PRECISION", "4294967296")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "VIDKIT_PROGRESS_PRECISION",
                ..
            }
        ));
    }
}
