//! CRI RuntimeService implementation.
//!
//! Container lifecycle is owned by the engine. The shim threads the
//! engine-issued container id through create → start → stop and passes
//! engine errors through; it does not track state or enforce ordering.

use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};

use podshim_core::config::ContainerDefaults;
use podshim_core::{ContainerEngine, ShimError};

use crate::container_config::build_descriptor;
use crate::cri_api::runtime_service_server::RuntimeService;
use crate::cri_api::*;
use crate::error::shim_error_to_status;
use crate::image_service::require_image;

/// Runtime name reported by `Version`.
pub const RUNTIME_NAME: &str = "podshim";

/// CRI API version implemented.
pub const RUNTIME_API_VERSION: &str = "v1";

/// CRI RuntimeService over a container engine.
pub struct ShimRuntimeService {
    engine: Arc<dyn ContainerEngine>,
    defaults: ContainerDefaults,
}

impl ShimRuntimeService {
    /// Create a new ShimRuntimeService.
    pub fn new(engine: Arc<dyn ContainerEngine>, defaults: ContainerDefaults) -> Self {
        Self { engine, defaults }
    }
}

fn require_container_id(id: &str) -> Result<(), Status> {
    if id.is_empty() {
        return Err(shim_error_to_status(ShimError::ValidationError(
            "container id required".to_string(),
        )));
    }
    Ok(())
}

/// CRI stop timeout in seconds. Zero kills immediately; negative leaves the
/// grace period to the engine.
fn stop_timeout(seconds: i64) -> Option<Duration> {
    u64::try_from(seconds).ok().map(Duration::from_secs)
}

fn to_cri_state(state: podshim_core::ContainerState) -> crate::cri_api::ContainerState {
    match state {
        podshim_core::ContainerState::Created => crate::cri_api::ContainerState::ContainerCreated,
        podshim_core::ContainerState::Running => crate::cri_api::ContainerState::ContainerRunning,
        podshim_core::ContainerState::Exited => crate::cri_api::ContainerState::ContainerExited,
        podshim_core::ContainerState::Unknown => crate::cri_api::ContainerState::ContainerUnknown,
    }
}

#[tonic::async_trait]
impl RuntimeService for ShimRuntimeService {
    async fn version(
        &self,
        request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        let _req = request.into_inner();
        let engine = self
            .engine
            .version()
            .await
            .map_err(|e| shim_error_to_status(e.within("version")))?;

        Ok(Response::new(VersionResponse {
            version: "0.1.0".to_string(),
            runtime_name: RUNTIME_NAME.to_string(),
            runtime_version: format!(
                "{} ({} {})",
                podshim_core::VERSION,
                engine.name,
                engine.version
            ),
            runtime_api_version: RUNTIME_API_VERSION.to_string(),
        }))
    }

    async fn create_container(
        &self,
        request: Request<CreateContainerRequest>,
    ) -> Result<Response<CreateContainerResponse>, Status> {
        let req = request.into_inner();
        let config = req.config.ok_or_else(|| {
            shim_error_to_status(ShimError::ValidationError(
                "container config required".to_string(),
            ))
        })?;
        let image = require_image(config.image.clone())?;

        tracing::info!(
            sandbox_id = %req.pod_sandbox_id,
            image = %image,
            "CRI CreateContainer"
        );

        let pulled = self
            .engine
            .ensure_image(&image)
            .await
            .map_err(|e| shim_error_to_status(e.within("pull image")))?;

        let details = self
            .engine
            .inspect_image(&pulled.id)
            .await
            .map_err(|e| shim_error_to_status(e.within("inspect image")))?;

        let id_mappings = self
            .engine
            .build_id_mappings(&self.defaults.id_mappings)
            .map_err(|e| shim_error_to_status(e.within("build ID mappings")))?;

        let descriptor = build_descriptor(
            &config,
            &req.pod_sandbox_id,
            &pulled,
            &details,
            id_mappings,
            &self.defaults,
        );

        let container_id = self
            .engine
            .create_container(descriptor)
            .await
            .map_err(|e| shim_error_to_status(e.within("create container")))?;

        tracing::info!(container_id = %container_id, image = %image, "Container created");

        Ok(Response::new(CreateContainerResponse { container_id }))
    }

    async fn start_container(
        &self,
        request: Request<StartContainerRequest>,
    ) -> Result<Response<StartContainerResponse>, Status> {
        let req = request.into_inner();
        let container_id = &req.container_id;
        require_container_id(container_id)?;

        tracing::info!(container_id = %container_id, "CRI StartContainer");

        let container = self
            .engine
            .get_container(container_id)
            .await
            .map_err(shim_error_to_status)?;

        self.engine
            .start(&container.id, false)
            .await
            .map_err(|e| shim_error_to_status(e.within("start container")))?;

        Ok(Response::new(StartContainerResponse {}))
    }

    async fn stop_container(
        &self,
        request: Request<StopContainerRequest>,
    ) -> Result<Response<StopContainerResponse>, Status> {
        let req = request.into_inner();
        let container_id = &req.container_id;
        require_container_id(container_id)?;

        tracing::info!(
            container_id = %container_id,
            timeout = req.timeout,
            "CRI StopContainer"
        );

        let container = self
            .engine
            .get_container(container_id)
            .await
            .map_err(shim_error_to_status)?;

        self.engine
            .stop(&container.id, stop_timeout(req.timeout))
            .await
            .map_err(|e| shim_error_to_status(e.within("stop container")))?;

        Ok(Response::new(StopContainerResponse {}))
    }

    async fn remove_container(
        &self,
        request: Request<RemoveContainerRequest>,
    ) -> Result<Response<RemoveContainerResponse>, Status> {
        let req = request.into_inner();
        let container_id = &req.container_id;
        require_container_id(container_id)?;

        tracing::info!(container_id = %container_id, "CRI RemoveContainer");

        match self.engine.remove_container(container_id).await {
            Ok(()) | Err(ShimError::UnknownHandle(_)) => {
                Ok(Response::new(RemoveContainerResponse {}))
            }
            Err(e) => Err(shim_error_to_status(e.within("remove container"))),
        }
    }

    async fn container_status(
        &self,
        request: Request<ContainerStatusRequest>,
    ) -> Result<Response<ContainerStatusResponse>, Status> {
        let req = request.into_inner();
        let container_id = &req.container_id;
        require_container_id(container_id)?;

        let container = self
            .engine
            .get_container(container_id)
            .await
            .map_err(shim_error_to_status)?;

        let status = ContainerStatus {
            id: container.id.clone(),
            metadata: None,
            state: to_cri_state(container.state).into(),
            created_at: container.created_at,
            started_at: container.started_at,
            finished_at: container.finished_at,
            exit_code: container.exit_code,
            image: Some(ImageSpec {
                image: container.image.clone(),
                annotations: Default::default(),
            }),
            image_ref: container.image_id.clone(),
            reason: String::new(),
            message: String::new(),
            labels: Default::default(),
            annotations: Default::default(),
            log_path: String::new(),
        };

        Ok(Response::new(ContainerStatusResponse {
            status: Some(status),
            info: Default::default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podshim_core::IdMappingOptions;
    use podshim_runtime::MemoryEngine;

    fn create_request(image: &str) -> CreateContainerRequest {
        CreateContainerRequest {
            pod_sandbox_id: String::new(),
            config: Some(ContainerConfig {
                image: Some(ImageSpec {
                    image: image.to_string(),
                    annotations: Default::default(),
                }),
                ..Default::default()
            }),
        }
    }

    fn service(engine: Arc<MemoryEngine>) -> ShimRuntimeService {
        ShimRuntimeService::new(engine, ContainerDefaults::default())
    }

    async fn create(svc: &ShimRuntimeService, image: &str) -> String {
        svc.create_container(Request::new(create_request(image)))
            .await
            .unwrap()
            .into_inner()
            .container_id
    }

    #[test]
    fn test_stop_timeout() {
        assert_eq!(stop_timeout(0), Some(Duration::ZERO));
        assert_eq!(stop_timeout(-1), None);
        assert_eq!(stop_timeout(-5), None);
        assert_eq!(stop_timeout(30), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_version() {
        let svc = service(Arc::new(MemoryEngine::new()));
        let resp = svc
            .version(Request::new(VersionRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.runtime_name, "podshim");
        assert_eq!(resp.runtime_api_version, "v1");
        assert!(resp.runtime_version.contains("memory"));
    }

    #[tokio::test]
    async fn test_create_uses_image_cmd() {
        let engine = Arc::new(MemoryEngine::new().with_image_command("hello-world", &["/hello"]));
        let svc = service(engine.clone());
        let id = create(&svc, "docker.io/library/hello-world").await;
        assert!(!id.is_empty());

        let desc = engine.descriptor(&id).await.unwrap();
        assert!(desc.entrypoint.is_none());
        assert_eq!(desc.command, vec!["/hello".to_string()]);
        assert!(desc.detach);
        assert_eq!(desc.work_dir, "/");
        assert_eq!(desc.stop_signal, "SIGTERM");
        assert!(desc.id_mappings.is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_config_and_image() {
        let svc = service(Arc::new(MemoryEngine::new()));
        let status = svc
            .create_container(Request::new(CreateContainerRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status = svc
            .create_container(Request::new(create_request("")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_create_unpullable_image() {
        let engine = Arc::new(MemoryEngine::new().with_unpullable("example.com/broken:1"));
        let svc = service(engine.clone());
        let status = svc
            .create_container(Request::new(create_request("example.com/broken:1")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(status.message().starts_with("pull image:"));
        assert_eq!(engine.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_with_invalid_id_mappings() {
        let engine = Arc::new(MemoryEngine::new());
        let defaults = ContainerDefaults {
            id_mappings: IdMappingOptions {
                uid_map: vec!["not-a-map".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let svc = ShimRuntimeService::new(engine.clone(), defaults);
        let status = svc
            .create_container(Request::new(create_request("alpine")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(engine.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle_and_timeout_forwarded() {
        let engine = Arc::new(MemoryEngine::new());
        let svc = service(engine.clone());
        let id = create(&svc, "alpine").await;

        svc.start_container(Request::new(StartContainerRequest {
            container_id: id.clone(),
        }))
        .await
        .unwrap();

        let status = svc
            .container_status(Request::new(ContainerStatusRequest {
                container_id: id.clone(),
                verbose: false,
            }))
            .await
            .unwrap()
            .into_inner()
            .status
            .unwrap();
        assert_eq!(
            status.state,
            i32::from(crate::cri_api::ContainerState::ContainerRunning)
        );
        assert!(status.started_at > 0);

        svc.stop_container(Request::new(StopContainerRequest {
            container_id: id.clone(),
            timeout: 7,
        }))
        .await
        .unwrap();
        assert_eq!(
            engine.last_stop_timeout(&id).await,
            Some(Duration::from_secs(7))
        );

        let status = svc
            .container_status(Request::new(ContainerStatusRequest {
                container_id: id.clone(),
                verbose: false,
            }))
            .await
            .unwrap()
            .into_inner()
            .status
            .unwrap();
        assert_eq!(
            status.state,
            i32::from(crate::cri_api::ContainerState::ContainerExited)
        );
    }

    #[tokio::test]
    async fn test_unknown_handle_is_not_found() {
        let svc = service(Arc::new(MemoryEngine::new()));
        let status = svc
            .start_container(Request::new(StartContainerRequest {
                container_id: "never-created".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status = svc
            .stop_container(Request::new(StopContainerRequest {
                container_id: "never-created".to_string(),
                timeout: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_empty_container_id_rejected() {
        let svc = service(Arc::new(MemoryEngine::new()));
        let status = svc
            .start_container(Request::new(StartContainerRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_remove_container_is_idempotent() {
        let engine = Arc::new(MemoryEngine::new());
        let svc = service(engine.clone());
        let id = create(&svc, "alpine").await;

        for _ in 0..2 {
            svc.remove_container(Request::new(RemoveContainerRequest {
                container_id: id.clone(),
            }))
            .await
            .unwrap();
        }
        assert_eq!(engine.container_count().await, 0);
    }
}
