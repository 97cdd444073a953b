//! podshim CRI - Kubernetes Container Runtime Interface binary.
//!
//! Serves CRI RuntimeService and ImageService over TCP, backed by a single
//! container engine handle created at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use podshim_core::{EngineKind, ServerConfig};
use podshim_cri::server::CriServer;

/// podshim CRI Runtime
#[derive(Parser, Debug)]
#[command(name = "podshim-cri", version, about = "CRI shim over a container engine")]
struct Args {
    /// YAML configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to serve CRI on (default 0.0.0.0:50052).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Engine backend: "docker" (Docker or Podman API) or "memory".
    #[arg(long)]
    engine: Option<EngineKind>,

    /// Engine API socket, e.g. unix:///run/podman/podman.sock.
    #[arg(long)]
    engine_socket: Option<String>,

    /// User namespace mode for created containers (e.g. "keep-id").
    #[arg(long)]
    userns: Option<String>,

    /// UID mapping container_id:host_id:size (repeatable).
    #[arg(long = "uidmap")]
    uid_map: Vec<String>,

    /// GID mapping container_id:host_id:size (repeatable).
    #[arg(long = "gidmap")]
    gid_map: Vec<String>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, podshim_core::ShimError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(engine) = self.engine {
            config.engine.kind = engine;
        }
        if self.engine_socket.is_some() {
            config.engine.socket = self.engine_socket;
        }
        if let Some(userns) = self.userns {
            config.container.id_mappings.userns_mode = userns;
        }
        if !self.uid_map.is_empty() {
            config.container.id_mappings.uid_map = self.uid_map;
        }
        if !self.gid_map.is_empty() {
            config.container.id_mappings.gid_map = self.gid_map;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    tracing::info!(
        listen = %config.listen_addr,
        engine = %config.engine.kind,
        "Starting podshim CRI"
    );

    let engine = podshim_runtime::open_engine(&config.engine).await?;

    let server = CriServer::new(config.listen_addr, engine, config.container);
    server
        .serve(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received interrupt, shutting down");
            }
        })
        .await?;

    Ok(())
}
