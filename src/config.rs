//! Selector configuration
//!
//! Loaded from YAML. Every field has a default so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! timing:
//!   busy_ms: 200
//!   lock_ms: 800
//!   stale_ms: 2000
//! catalog:
//!   base_url: "http://localhost:8080/api/locations/"
//!   timeout_secs: 30
//!   endpoints:
//!     village: "villages"
//! ```

use crate::error::ConfigError;
use basin_types::Level;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// The three liveness durations of the reconciliation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// T1: how long a writer stays "busy" after its write is accepted
    #[serde(default = "default_busy_ms")]
    pub busy_ms: u64,
    /// T2: lock window duration
    #[serde(default = "default_lock_ms")]
    pub lock_ms: u64,
    /// T3: age past which a stored snapshot is treated as abandoned
    #[serde(default = "default_stale_ms")]
    pub stale_ms: u64,
}

fn default_busy_ms() -> u64 {
    200
}

fn default_lock_ms() -> u64 {
    800
}

fn default_stale_ms() -> u64 {
    2000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            busy_ms: default_busy_ms(),
            lock_ms: default_lock_ms(),
            stale_ms: default_stale_ms(),
        }
    }
}

impl TimingConfig {
    pub fn new(busy_ms: u64, lock_ms: u64, stale_ms: u64) -> Result<Self, ConfigError> {
        let timing = Self {
            busy_ms,
            lock_ms,
            stale_ms,
        };
        timing.validate()?;
        Ok(timing)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.busy_ms < self.lock_ms && self.lock_ms < self.stale_ms {
            Ok(())
        } else {
            Err(ConfigError::TimingOrder {
                busy_ms: self.busy_ms,
                lock_ms: self.lock_ms,
                stale_ms: self.stale_ms,
            })
        }
    }

    pub fn busy(&self) -> Duration {
        Duration::from_millis(self.busy_ms)
    }

    pub fn lock(&self) -> Duration {
        Duration::from_millis(self.lock_ms)
    }

    pub fn stale(&self) -> Duration {
        Duration::from_millis(self.stale_ms)
    }
}

/// Where and how to reach the location catalog service.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-level endpoint path, relative to `base_url`. Missing levels fall
    /// back to the plural level name.
    #[serde(default)]
    pub endpoints: HashMap<Level, String>,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/locations/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            endpoints: HashMap::new(),
        }
    }
}

impl CatalogConfig {
    /// Endpoint path for a level
    pub fn endpoint(&self, level: Level) -> String {
        self.endpoints
            .get(&level)
            .cloned()
            .unwrap_or_else(|| default_endpoint(level).to_string())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|source| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint(level: Level) -> &'static str {
    match level {
        Level::River => "rivers",
        Level::Stretch => "stretches",
        Level::Drain => "drains",
        Level::Catchment => "catchments",
        Level::Village => "villages",
    }
}

impl SelectorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: SelectorConfig = serde_yaml::from_str(content)?;
        config.timing.validate()?;
        config.catalog.base_url()?;
        Ok(config)
    }
}
