// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Node configuration (TOML).
//!
//! ```text
//! [node]
//! name = "seed-1"
//! data_dir = "/srv/meshdata/data"
//!
//! [http]
//! listen_addr = "127.0.0.1:9090"
//!
//! [storage]
//! prune_interval_secs = 60
//!
//! [keep_alive]
//! interval_secs = 60
//! max_idle_secs = 180
//! timeout_secs = 90
//!
//! [authorization]
//! preferred = ["hash_cash"]
//! ```

use crate::networking::authorization::AuthorizationTokenType;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read config file.
    #[error("read config")]
    Read,
    /// Cannot parse TOML.
    #[error("parse config: {0}")]
    Parse(String),
    /// A value is out of its accepted range.
    #[error("invalid config value: {0}")]
    Invalid(&'static str),
}

/// Node configuration root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node settings.
    pub node: NodeSettings,
    /// HTTP endpoints.
    pub http: HttpConfig,
    /// Data store settings.
    pub storage: StorageConfig,
    /// Keep-alive settings.
    pub keep_alive: KeepAliveSettings,
    /// Authorization token settings.
    pub authorization: AuthorizationSettings,
}

impl NodeConfig {
    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|_| ConfigError::Read)?;
        Self::parse(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let cfg: NodeConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("node.data_dir"));
        }
        if self.storage.prune_interval_secs == 0 {
            return Err(ConfigError::Invalid("storage.prune_interval_secs"));
        }
        if self.keep_alive.interval_secs == 0 {
            return Err(ConfigError::Invalid("keep_alive.interval_secs"));
        }
        if self.keep_alive.timeout_secs == 0 {
            return Err(ConfigError::Invalid("keep_alive.timeout_secs"));
        }
        if self.authorization.preferred.is_empty() {
            return Err(ConfigError::Invalid("authorization.preferred"));
        }
        Ok(())
    }
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (store databases live under `<data_dir>/db`).
    pub data_dir: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self { name: "meshdata".to_string(), data_dir: "./data".to_string() }
    }
}

/// HTTP config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Metrics listen address, e.g. 0.0.0.0:9090.
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:9090".to_string() }
    }
}

/// Data store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Interval of the TTL sweep.
    pub prune_interval_secs: u64,
    /// sled background flush interval.
    pub flush_every_ms: u64,
    /// Upper bound for the final flush on shutdown.
    pub shutdown_flush_timeout_ms: u64,
    /// Age after which per-owner sequence bookkeeping is forgotten.
    pub tombstone_max_age_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prune_interval_secs: 60,
            flush_every_ms: 1_000,
            shutdown_flush_timeout_ms: 5_000,
            tombstone_max_age_secs: 10 * 24 * 60 * 60,
        }
    }
}

impl StorageConfig {
    /// Prune interval as a duration.
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
    /// Shutdown flush bound as a duration.
    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_flush_timeout_ms)
    }
    /// Tombstone age in milliseconds.
    pub fn tombstone_max_age_ms(&self) -> u64 {
        self.tombstone_max_age_secs.saturating_mul(1000)
    }
}

/// Keep-alive settings as written in the config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveSettings {
    /// Scheduler interval.
    pub interval_secs: u64,
    /// Idle time after which a connection is probed.
    pub max_idle_secs: u64,
    /// Time to wait for the pong.
    pub timeout_secs: u64,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self { interval_secs: 60, max_idle_secs: 180, timeout_secs: 90 }
    }
}

/// Authorization token settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationSettings {
    /// Token types in order of local preference.
    pub preferred: Vec<AuthorizationTokenType>,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self { preferred: vec![AuthorizationTokenType::HashCash] }
    }
}
