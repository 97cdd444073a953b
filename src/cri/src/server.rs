//! gRPC server setup for CRI services.
//!
//! Listens on a TCP address for CRI RuntimeService and ImageService RPCs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use podshim_core::config::ContainerDefaults;
use podshim_core::ContainerEngine;

use crate::cri_api::image_service_server::ImageServiceServer;
use crate::cri_api::runtime_service_server::RuntimeServiceServer;
use crate::image_service::ShimImageService;
use crate::runtime_service::ShimRuntimeService;

/// CRI gRPC server configuration.
pub struct CriServer {
    /// Address to listen on.
    listen_addr: SocketAddr,
    /// Runtime handle shared by both services.
    engine: Arc<dyn ContainerEngine>,
    /// Fixed settings for created containers.
    defaults: ContainerDefaults,
}

impl CriServer {
    /// Create a new CRI server.
    pub fn new(
        listen_addr: SocketAddr,
        engine: Arc<dyn ContainerEngine>,
        defaults: ContainerDefaults,
    ) -> Self {
        Self {
            listen_addr,
            engine,
            defaults,
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve<F>(
        &self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.listen_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        let runtime_service = ShimRuntimeService::new(self.engine.clone(), self.defaults.clone());
        let image_service = ShimImageService::new(self.engine.clone());

        tracing::info!(addr = %listener.local_addr()?, "CRI server listening");

        Server::builder()
            .add_service(RuntimeServiceServer::new(runtime_service))
            .add_service(ImageServiceServer::new(image_service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        tracing::info!("CRI server stopped");
        Ok(())
    }
}
