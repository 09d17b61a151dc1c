//! Configuration for an ILP routing node.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $ILP_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ilp/config.toml
//!   3. ~/.config/ilp/config.toml

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ccp::{
    DEFAULT_ROUTE_BROADCAST_INTERVAL, DEFAULT_ROUTE_EXPIRY, MAX_EPOCHS_PER_UPDATE,
    MINIMUM_UPDATE_INTERVAL, ROUTE_CONTROL_RETRY_INTERVAL,
};
use crate::prefix::{is_prefix_of, is_valid_address};
use crate::route::{PeerId, Relation};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub ccp: CcpSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<PeerConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<StaticRouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Our own ILP address. Advertised to peers as a prefix.
    pub address: String,
    /// Top-level segment covering the whole address space, e.g. "g".
    pub global_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CcpSettings {
    /// Heartbeat interval for route updates; also the per-update timeout.
    pub route_broadcast_interval_ms: u64,
    /// Hold-down time we advertise with our updates.
    pub route_expiry_ms: u64,
    /// Delay between failed route control attempts.
    pub route_control_retry_ms: u64,
    pub min_update_interval_ms: u64,
    pub max_epochs_per_update: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: PeerId,
    pub relation: Relation,
    /// Broadcast our routes to this peer.
    #[serde(default = "default_true")]
    pub send_routes: bool,
    /// Request this peer's routes.
    #[serde(default = "default_true")]
    pub receive_routes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    pub prefix: String,
    pub peer: PeerId,
    #[serde(default)]
    pub path: Vec<PeerId>,
}

fn default_true() -> bool {
    true
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            address: "g.node".to_string(),
            global_prefix: "g".to_string(),
        }
    }
}

impl Default for CcpSettings {
    fn default() -> Self {
        Self {
            route_broadcast_interval_ms: DEFAULT_ROUTE_BROADCAST_INTERVAL.as_millis() as u64,
            route_expiry_ms: DEFAULT_ROUTE_EXPIRY.as_millis() as u64,
            route_control_retry_ms: ROUTE_CONTROL_RETRY_INTERVAL.as_millis() as u64,
            min_update_interval_ms: MINIMUM_UPDATE_INTERVAL.as_millis() as u64,
            max_epochs_per_update: MAX_EPOCHS_PER_UPDATE,
        }
    }
}

impl CcpSettings {
    pub fn route_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.route_broadcast_interval_ms)
    }

    pub fn route_expiry(&self) -> Duration {
        Duration::from_millis(self.route_expiry_ms)
    }

    pub fn route_control_retry(&self) -> Duration {
        Duration::from_millis(self.route_control_retry_ms)
    }

    pub fn min_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_update_interval_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("ilp")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific file, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(NodeConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ILP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    pub fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&NodeConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply ILP_* overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ILP_NODE__ADDRESS") {
            self.node.address = v;
        }
        if let Some(v) = lookup("ILP_NODE__GLOBAL_PREFIX") {
            self.node.global_prefix = v;
        }
        if let Some(ms) = lookup("ILP_CCP__ROUTE_BROADCAST_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.ccp.route_broadcast_interval_ms = ms;
        }
        if let Some(ms) = lookup("ILP_CCP__ROUTE_EXPIRY_MS").and_then(|v| v.parse().ok()) {
            self.ccp.route_expiry_ms = ms;
        }
    }

    /// Reject configs the router cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let node = &self.node;
        if !is_valid_address(&node.address) {
            return Err(ConfigError::Invalid(format!("malformed address {:?}", node.address)));
        }
        if node.global_prefix.is_empty()
            || node.global_prefix.contains('.')
            || !is_prefix_of(&node.global_prefix, &node.address)
            || node.global_prefix == node.address
        {
            return Err(ConfigError::Invalid(format!(
                "address {:?} is not under global prefix {:?}",
                node.address, node.global_prefix
            )));
        }
        if self.ccp.max_epochs_per_update == 0 {
            return Err(ConfigError::Invalid("max_epochs_per_update must be positive".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate peer {:?}", peer.id)));
            }
        }
        for route in &self.routes {
            if !seen.contains(route.peer.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "static route {:?} names unknown peer {:?}",
                    route.prefix, route.peer
                )));
            }
        }
        Ok(())
    }
}
