use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, ShimError};
use crate::idmap::IdMappingOptions;

/// Default CRI listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:50052";

/// Shim server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP address the CRI services bind to
    pub listen_addr: SocketAddr,

    /// Container engine backend
    pub engine: EngineConfig,

    /// Defaults applied to every created container
    pub container: ContainerDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 50052))),
            engine: EngineConfig::default(),
            container: ContainerDefaults::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file. Missing keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ShimError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: ServerConfig = serde_yaml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }
}

/// Which engine implementation backs the runtime handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Docker-compatible REST API (Docker or the Podman API service)
    #[default]
    Docker,
    /// In-process engine, no real containers
    Memory,
}

impl FromStr for EngineKind {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" | "podman" => Ok(EngineKind::Docker),
            "memory" => Ok(EngineKind::Memory),
            other => Err(ShimError::ConfigError(format!(
                "unknown engine '{}', expected 'docker' or 'memory'",
                other
            ))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Docker => write!(f, "docker"),
            EngineKind::Memory => write!(f, "memory"),
        }
    }
}

/// Engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,

    /// Engine API socket (e.g. "unix:///run/podman/podman.sock").
    /// Falls back to the engine's own default (DOCKER_HOST or
    /// /var/run/docker.sock) when unset.
    pub socket: Option<String>,

    /// Per-request timeout for engine API calls, in seconds
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Docker,
            socket: None,
            timeout_secs: 120,
        }
    }
}

/// Fixed container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDefaults {
    /// Working directory when the request leaves it empty
    pub work_dir: String,

    /// Signal the engine sends on stop
    pub stop_signal: String,

    /// User-namespace mappings for every container (empty = none)
    pub id_mappings: IdMappingOptions,
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self {
            work_dir: "/".to_string(),
            stop_signal: "SIGTERM".to_string(),
            id_mappings: IdMappingOptions::default(),
        }
    }
}
