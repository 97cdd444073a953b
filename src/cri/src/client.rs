//! Thin CRI client used by the smoke-test binary and integration tests.

use tonic::transport::Channel;

use podshim_core::{Result, ShimError};

use crate::cri_api::image_service_client::ImageServiceClient;
use crate::cri_api::runtime_service_client::RuntimeServiceClient;
use crate::cri_api::*;
use crate::error::status_to_shim_error;

/// Connected CRI client for both services.
#[derive(Clone)]
pub struct CriClient {
    images: ImageServiceClient<Channel>,
    runtime: RuntimeServiceClient<Channel>,
}

impl CriClient {
    /// Connect to a CRI endpoint such as `http://localhost:50052`.
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let channel = Channel::from_shared(address.clone())
            .map_err(|e| ShimError::ConfigError(format!("invalid address {}: {}", address, e)))?
            .connect()
            .await
            .map_err(|e| ShimError::ConnectionError(format!("{}: {}", address, e)))?;

        Ok(Self {
            images: ImageServiceClient::new(channel.clone()),
            runtime: RuntimeServiceClient::new(channel),
        })
    }

    /// Pull an image; returns the reported image reference.
    pub async fn pull_image(&mut self, image: &str) -> Result<String> {
        let resp = self
            .images
            .pull_image(PullImageRequest {
                image: Some(image_spec(image)),
                auth: None,
            })
            .await
            .map_err(status_to_shim_error)?;
        Ok(resp.into_inner().image_ref)
    }

    /// Create a container from `image` with the given environment.
    pub async fn create_container(
        &mut self,
        image: &str,
        envs: &[(String, String)],
    ) -> Result<String> {
        let config = ContainerConfig {
            image: Some(image_spec(image)),
            envs: envs
                .iter()
                .map(|(key, value)| KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            ..Default::default()
        };

        let resp = self
            .runtime
            .create_container(CreateContainerRequest {
                pod_sandbox_id: String::new(),
                config: Some(config),
            })
            .await
            .map_err(status_to_shim_error)?;
        Ok(resp.into_inner().container_id)
    }

    pub async fn start_container(&mut self, container_id: &str) -> Result<StartContainerResponse> {
        self.runtime
            .start_container(StartContainerRequest {
                container_id: container_id.to_string(),
            })
            .await
            .map(|r| r.into_inner())
            .map_err(status_to_shim_error)
    }

    /// Stop a container. `timeout` is the grace period in seconds: 0 kills
    /// immediately, negative uses the engine default.
    pub async fn stop_container(
        &mut self,
        container_id: &str,
        timeout: i64,
    ) -> Result<StopContainerResponse> {
        self.runtime
            .stop_container(StopContainerRequest {
                container_id: container_id.to_string(),
                timeout,
            })
            .await
            .map(|r| r.into_inner())
            .map_err(status_to_shim_error)
    }

    pub async fn version(&mut self) -> Result<VersionResponse> {
        self.runtime
            .version(VersionRequest::default())
            .await
            .map(|r| r.into_inner())
            .map_err(status_to_shim_error)
    }
}

fn image_spec(image: &str) -> ImageSpec {
    ImageSpec {
        image: image.to_string(),
        annotations: Default::default(),
    }
}
