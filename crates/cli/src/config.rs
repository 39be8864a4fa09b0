//! `lure.toml` configuration.
//!
//! # Example
//!
//! ```toml
//! screening_policy = "suppress"
//!
//! [server]
//! port = 8080
//! rate_limit = 120
//! trust_forwarded_for = true
//!
//! [storage]
//! data_file = "lure-data.json"
//! flush_interval_secs = 30
//!
//! [tracking]
//! landing_url = "https://intranet.example.com/login"
//! redirect_url = "https://intranet.example.com/"
//!
//! [classifier]
//! user_agent_signatures = ["GoogleImageProxy", "Proofpoint"]
//! cidr_blocks = ["66.249.84.0/24"]
//!
//! [[geo.entries]]
//! cidr = "198.51.100.0/24"
//! latitude = 51.5074
//! longitude = -0.1278
//! ```
//!
//! Every section is optional. `LURE_RATE_LIMIT` and `LURE_API_KEY` override
//! the file.

use std::path::{Path, PathBuf};

use lure_core::{ClassifierConfig, ScreeningPolicy};
use lure_tracker::GeoEntry;
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given, if present.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "lure.toml";

const DEFAULT_PORT: u16 = 8080;

/// Default rate limit: 60 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 60;

const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LureConfig {
    pub(crate) server: ServerConfig,
    pub(crate) storage: StorageConfig,
    pub(crate) tracking: TrackingConfig,
    pub(crate) classifier: ClassifierConfig,
    pub(crate) screening_policy: ScreeningPolicy,
    pub(crate) geo: GeoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    /// Admin API requests per minute per IP.
    pub(crate) rate_limit: u64,
    /// Bearer key for the admin API. `None` disables auth.
    pub(crate) api_key: Option<String>,
    /// Take the client address from the first `X-Forwarded-For` entry.
    pub(crate) trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rate_limit: DEFAULT_RATE_LIMIT,
            api_key: None,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct StorageConfig {
    /// JSON dump loaded at startup and written back on shutdown. Without it
    /// the store lives only in memory.
    pub(crate) data_file: Option<PathBuf>,
    /// How often a changed store is written to `data_file` while serving.
    /// `0` leaves only the shutdown write, so a crash loses every hit since
    /// startup.
    pub(crate) flush_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct TrackingConfig {
    /// Where a clicked link lands. Without it a placeholder page is served.
    pub(crate) landing_url: Option<String>,
    /// Where a form submission redirects.
    pub(crate) redirect_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GeoConfig {
    pub(crate) entries: Vec<GeoEntry>,
}

impl LureConfig {
    /// Load configuration from `path`, or from `lure.toml` in the working
    /// directory when it exists, or fall back to defaults. Environment
    /// overrides are applied last.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::read(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::read(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_overrides(
        &mut self,
        get: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = get("LURE_RATE_LIMIT") {
            self.server.rate_limit = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "LURE_RATE_LIMIT",
                    value,
                })?;
        }
        if let Some(key) = get("LURE_API_KEY").filter(|k| !k.is_empty()) {
            self.server.api_key = Some(key);
        }
        Ok(())
    }
}
