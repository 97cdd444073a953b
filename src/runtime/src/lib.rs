//! podshim Runtime - container engine backends.
//!
//! Provides the concrete [`ContainerEngine`] implementations behind the
//! shim's runtime handle: the Docker-compatible API (Docker or Podman) and an
//! in-process engine for tests and dry runs.

pub mod docker;
pub mod memory;
pub mod reference;

use std::sync::Arc;

use podshim_core::{ContainerEngine, EngineConfig, EngineKind, Result};

// Re-export common types
pub use docker::DockerEngine;
pub use memory::MemoryEngine;
pub use reference::ImageReference;

/// podshim Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Construct the process-wide runtime handle for the configured engine.
pub async fn open_engine(config: &EngineConfig) -> Result<Arc<dyn ContainerEngine>> {
    tracing::info!(engine = %config.kind, "Opening container engine");
    match config.kind {
        EngineKind::Docker => Ok(Arc::new(DockerEngine::connect(config).await?)),
        EngineKind::Memory => Ok(Arc::new(MemoryEngine::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_engine() {
        let config = EngineConfig {
            kind: EngineKind::Memory,
            ..Default::default()
        };
        let engine = open_engine(&config).await.unwrap();
        let version = engine.version().await.unwrap();
        assert_eq!(version.name, "memory");
    }

    #[tokio::test]
    async fn test_open_docker_engine_unreachable() {
        let config = EngineConfig {
            kind: EngineKind::Docker,
            socket: Some("/nonexistent/podshim-test.sock".to_string()),
            timeout_secs: 1,
        };
        let err = open_engine(&config).await.err().unwrap();
        assert!(matches!(err, podshim_core::ShimError::ConnectionError(_)));
    }
}
