//! Configuration file loading and validation.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when `key` is absent from the file.
pub const KEY_ENV: &str = "CD_API_KEY";
/// Environment variable consulted when `secret` is absent from the file.
pub const SECRET_ENV: &str = "CD_API_SECRET";

/// Content written by `sample-config`.
pub const SAMPLE_CONFIG: &str = r#"# dumpsync configuration
save_location = "./dataFiles"
# if not defined, defaults to "./unpackedFiles"
unpack_location = "./unpackedFiles"
state_file = "./state.json"
api_url = "https://api.inshosteddata.com/api"
# don't hardcode creds, prefer the CD_API_KEY and CD_API_SECRET environment variables
# key = ""
# secret = ""
max_connections = 5

[retry]
max_attempts = 5
initial_delay = "100ms"
multiplier = 2.0
"#;

/// Retry policy for a single file download.
///
/// `max_attempts` counts every attempt, the first one included. The delay
/// before retry `n` (0-based) is `initial_delay * multiplier^n`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(deserialize_with = "human_duration")]
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delays to sleep between attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let initial = self.initial_delay;
        let multiplier = self.multiplier;
        (0..self.max_attempts.saturating_sub(1))
            .map(move |n| {
                let secs = initial.as_secs_f64() * multiplier.powi(n as i32);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            })
    }
}

fn human_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Credentials and endpoint of the export API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_url: String,
    pub key: String,
    pub secret: String,
}

/// Fully resolved configuration for a run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the local mirror.
    pub save_location: PathBuf,
    /// Output directory of `unpack`.
    pub unpack_location: PathBuf,
    /// Path of the persisted sync cursor.
    pub state_file: PathBuf,
    pub api: ApiConfig,
    /// Concurrency ceiling for table groups and for files within an artifact.
    pub max_connections: usize,
    pub retry: RetryConfig,
}

/// Config file as written by the user, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub save_location: Option<PathBuf>,
    pub unpack_location: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub api_url: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub max_connections: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl RawConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SyncError::Config(format!("invalid config: {}", e)))
    }

    /// Validates required fields and anchors relative paths at `base`.
    ///
    /// `env` is consulted for credentials missing from the file.
    pub fn resolve<F>(self, base: &Path, env: F) -> Result<SyncConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = self.key.or_else(|| env(KEY_ENV)).filter(|k| !k.is_empty());
        let secret = self
            .secret
            .or_else(|| env(SECRET_ENV))
            .filter(|s| !s.is_empty());
        let api_url = self.api_url.filter(|u| !u.is_empty());

        let mut missing = Vec::new();
        if self.save_location.is_none() {
            missing.push("save_location");
        }
        if api_url.is_none() {
            missing.push("api_url");
        }
        if key.is_none() {
            missing.push("key");
        }
        if secret.is_none() {
            missing.push("secret");
        }
        let (Some(save_location), Some(api_url), Some(key), Some(secret)) =
            (self.save_location, api_url, key, secret)
        else {
            return Err(SyncError::Config(format!(
                "missing {} fields in config",
                missing.join(", ")
            )));
        };

        let max_connections = self.max_connections.unwrap_or(5);
        if max_connections == 0 {
            return Err(SyncError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 0.0) {
            return Err(SyncError::Config(
                "retry.multiplier must be a non-negative number".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(SyncConfig {
            save_location: base.join(save_location),
            unpack_location: base.join(
                self.unpack_location
                    .unwrap_or_else(|| PathBuf::from("./unpackedFiles")),
            ),
            state_file: base.join(
                self.state_file
                    .unwrap_or_else(|| PathBuf::from("./state.json")),
            ),
            api: ApiConfig {
                api_url,
                key,
                secret,
            },
            max_connections,
            retry: self.retry,
        })
    }
}
