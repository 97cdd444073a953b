//! Container engine interface.
//!
//! The shim never touches images or processes itself. Every operation is
//! delegated to a [`ContainerEngine`], constructed once at process start and
//! shared by all RPC handlers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::idmap::{IdMappingOptions, IdMappingSet};

/// An image made available locally by [`ContainerEngine::ensure_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledImage {
    /// Engine-assigned image identifier (usually a digest).
    pub id: String,
    /// The reference the caller asked for, as the engine recorded it.
    pub input_name: String,
}

/// Result of inspecting a local image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDetails {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    /// Size in bytes.
    pub size: u64,
    /// Image ENTRYPOINT; empty when unset.
    pub entrypoint: Vec<String>,
    /// Image CMD; the entrypoint's arguments when one is set.
    pub cmd: Vec<String>,
}

/// Everything the engine needs to create one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    /// Optional human-readable name; engines generate one when absent.
    pub name: Option<String>,
    /// Entrypoint override; `None` keeps the image's own entrypoint.
    pub entrypoint: Option<Vec<String>>,
    /// Arguments (CMD). Empty leaves the engine to apply the image default.
    pub command: Vec<String>,
    /// Always true: the shim never attaches to container I/O.
    pub detach: bool,
    pub env: Vec<(String, String)>,
    pub labels: HashMap<String, String>,
    pub id_mappings: IdMappingSet,
    /// Image reference as requested.
    pub image: String,
    /// Engine image identifier returned by the pull.
    pub image_id: String,
    /// Network or pod-sandbox identifier, passed through untouched.
    pub network: String,
    pub work_dir: String,
    pub stop_signal: String,
}

/// Lifecycle state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Created,
    Running,
    Exited,
    Unknown,
}

/// Engine-side view of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub image: String,
    pub image_id: String,
    pub state: ContainerState,
    /// Timestamps in nanoseconds since the epoch (0 when unset).
    pub created_at: i64,
    pub started_at: i64,
    pub finished_at: i64,
    pub exit_code: i32,
}

/// Engine name and version, surfaced through the CRI `Version` RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    pub name: String,
    pub version: String,
}

/// The external container-management engine.
///
/// Implementations own all state: images, containers and their lifecycle.
/// Errors must already be mapped into [`crate::ShimError`] kinds, with
/// unknown identifiers reported as `UnknownHandle`.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Make `reference` available locally, pulling only if missing.
    async fn ensure_image(&self, reference: &str) -> Result<PulledImage>;

    /// Inspect a local image by identifier.
    async fn inspect_image(&self, image_id: &str) -> Result<ImageDetails>;

    /// Look up a local image without pulling it.
    async fn find_image(&self, reference: &str) -> Result<Option<ImageDetails>>;

    /// Remove a local image. An absent image is `UnknownHandle`.
    async fn remove_image(&self, reference: &str) -> Result<()>;

    /// Resolve user-namespace options into concrete ID mappings.
    fn build_id_mappings(&self, options: &IdMappingOptions) -> Result<IdMappingSet>;

    /// Create a container and return its identifier.
    async fn create_container(&self, descriptor: ContainerDescriptor) -> Result<String>;

    /// Look up a container by identifier.
    async fn get_container(&self, id: &str) -> Result<ContainerRef>;

    /// Start a created container.
    async fn start(&self, id: &str, attach: bool) -> Result<()>;

    /// Stop a container. `None` leaves the grace period to the engine.
    async fn stop(&self, id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Remove a container, stopping it first if needed. An absent container
    /// is `UnknownHandle`.
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Engine name and version.
    async fn version(&self) -> Result<EngineVersion>;
}
