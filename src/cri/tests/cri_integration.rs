//! Integration test: CRI RPCs over a real gRPC connection.
//!
//! Each test starts the shim on an ephemeral localhost port, backed by the
//! in-memory engine, and drives it through `CriClient`:
//!
//! 1. Pull an image and check the reference is echoed
//! 2. Create, start and stop a container
//! 3. Check engine errors and unknown handles surface as RPC errors
//!
//! ```bash
//! cargo test -p podshim-cri --test cri_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use podshim_core::config::ContainerDefaults;
use podshim_core::{ContainerEngine, ContainerState, ShimError};
use podshim_cri::client::CriClient;
use podshim_cri::server::CriServer;
use podshim_runtime::MemoryEngine;

/// Running shim; dropping it shuts the server down.
struct TestServer {
    address: String,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server(engine: Arc<MemoryEngine>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = CriServer::new(addr, engine, ContainerDefaults::default());
    tokio::spawn(async move {
        server
            .serve_on(listener, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        address: format!("http://{}", addr),
        _shutdown: tx,
    }
}

async fn connect(server: &TestServer) -> CriClient {
    CriClient::connect(server.address.clone()).await.unwrap()
}

#[tokio::test]
async fn test_pull_image_echoes_reference() {
    let server = start_server(Arc::new(MemoryEngine::new())).await;
    let mut client = connect(&server).await;

    let image_ref = client
        .pull_image("docker.io/library/alpine:latest")
        .await
        .unwrap();
    assert_eq!(image_ref, "docker.io/library/alpine:latest");
}

#[tokio::test]
async fn test_pull_image_engine_failure() {
    let engine = Arc::new(MemoryEngine::new().with_unpullable("example.com/private/app:1"));
    let server = start_server(engine).await;
    let mut client = connect(&server).await;

    let err = client
        .pull_image("example.com/private/app:1")
        .await
        .unwrap_err();
    assert!(matches!(err, ShimError::EngineError { .. }));
    assert!(err.to_string().contains("pull image"));
}

#[tokio::test]
async fn test_pull_empty_image_rejected() {
    let server = start_server(Arc::new(MemoryEngine::new())).await;
    let mut client = connect(&server).await;

    let err = client.pull_image("").await.unwrap_err();
    assert!(matches!(err, ShimError::ValidationError(_)));
}

#[tokio::test]
async fn test_create_start_stop_sequence() {
    let engine = Arc::new(MemoryEngine::new());
    let server = start_server(engine.clone()).await;
    let mut client = connect(&server).await;

    let container_id = client
        .create_container("docker.io/library/hello-world", &[])
        .await
        .unwrap();
    assert!(!container_id.is_empty());

    client.start_container(&container_id).await.unwrap();
    assert_eq!(
        engine.get_container(&container_id).await.unwrap().state,
        ContainerState::Running
    );

    client.stop_container(&container_id, 0).await.unwrap();
    let container = engine.get_container(&container_id).await.unwrap();
    assert_eq!(container.state, ContainerState::Exited);
    assert_eq!(
        engine.last_stop_timeout(&container_id).await,
        Some(Duration::ZERO)
    );
}

#[tokio::test]
async fn test_create_forwards_environment() {
    let engine = Arc::new(MemoryEngine::new());
    let server = start_server(engine.clone()).await;
    let mut client = connect(&server).await;

    let envs = vec![(
        "HZN_ORG_ID".to_string(),
        "major-peacock-icp-cluster".to_string(),
    )];
    let container_id = client
        .create_container("quay.io/libpod/alpine_nginx", &envs)
        .await
        .unwrap();

    let descriptor = engine.descriptor(&container_id).await.unwrap();
    assert_eq!(descriptor.env, envs);
    assert_eq!(descriptor.image, "quay.io/libpod/alpine_nginx");
}

#[tokio::test]
async fn test_create_unpullable_image_returns_no_id() {
    let engine = Arc::new(MemoryEngine::new().with_unpullable("registry.invalid/missing"));
    let server = start_server(engine.clone()).await;
    let mut client = connect(&server).await;

    let result = client
        .create_container("registry.invalid/missing", &[])
        .await;
    assert!(result.is_err());
    assert_eq!(engine.container_count().await, 0);
}

#[tokio::test]
async fn test_start_unknown_handle() {
    let server = start_server(Arc::new(MemoryEngine::new())).await;
    let mut client = connect(&server).await;

    let err = client.start_container("never-issued").await.unwrap_err();
    assert!(matches!(err, ShimError::UnknownHandle(_)));
}

#[tokio::test]
async fn test_stop_before_start_follows_engine() {
    let engine = Arc::new(MemoryEngine::new());
    let server = start_server(engine.clone()).await;
    let mut client = connect(&server).await;

    let container_id = client.create_container("alpine", &[]).await.unwrap();

    // The in-memory engine treats stopping a non-running container as a no-op.
    client.stop_container(&container_id, 10).await.unwrap();
    assert_eq!(
        engine.get_container(&container_id).await.unwrap().state,
        ContainerState::Created
    );
    assert_eq!(
        engine.last_stop_timeout(&container_id).await,
        Some(Duration::from_secs(10))
    );
}

#[tokio::test]
async fn test_server_keeps_serving_after_errors() {
    let engine = Arc::new(MemoryEngine::new().with_unpullable("bad.example/img"));
    let server = start_server(engine).await;
    let mut client = connect(&server).await;

    assert!(client.pull_image("bad.example/img").await.is_err());
    assert!(client.start_container("nope").await.is_err());
    assert_eq!(client.pull_image("alpine").await.unwrap(), "alpine");
}

#[tokio::test]
async fn test_version() {
    let server = start_server(Arc::new(MemoryEngine::new())).await;
    let mut client = connect(&server).await;

    let version = client.version().await.unwrap();
    assert_eq!(version.runtime_name, "podshim");
    assert_eq!(version.runtime_api_version, "v1");
}

#[tokio::test]
async fn test_connect_refused() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = CriClient::connect(format!("http://{}", addr))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ShimError::ConnectionError(_)));
}
