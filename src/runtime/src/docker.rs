//! Container engine backed by the Docker-compatible REST API.
//!
//! Works against Docker itself and against the Podman API service
//! (`podman system service`), which exposes the same endpoints.

use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::{ContainerStateStatusEnum, HostConfig, ImageInspect};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;

use podshim_core::{
    ContainerDescriptor, ContainerEngine, ContainerRef, ContainerState, EngineConfig,
    EngineVersion, IdMappingOptions, IdMappingSet, ImageDetails, PulledImage, Result, ShimError,
};

use crate::reference::ImageReference;

/// [`ContainerEngine`] over a Docker or Podman API socket.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the engine and verify it answers.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let docker = match config.socket.as_deref() {
            Some(addr) if addr.starts_with("tcp://") || addr.starts_with("http://") => {
                Docker::connect_with_http(addr, config.timeout_secs, &API_DEFAULT_VERSION)
            }
            Some(path) => {
                Docker::connect_with_socket(path, config.timeout_secs, &API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults()
                .map(|d| d.with_timeout(Duration::from_secs(config.timeout_secs))),
        }
        .map_err(|e| ShimError::ConnectionError(e.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| ShimError::ConnectionError(format!("engine did not answer ping: {}", e)))?;

        tracing::info!(
            socket = config.socket.as_deref().unwrap_or("default"),
            "Connected to container engine"
        );

        Ok(Self { docker })
    }

    async fn inspect(&self, reference: &str) -> Result<Option<ImageInspect>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(Some(image)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_error("inspect image", e)),
        }
    }

    async fn pull(&self, reference: &str) -> Result<()> {
        let parsed = ImageReference::parse(reference).map_err(|e| e.within("pull image"))?;
        let from_image = format!("{}/{}", parsed.registry, parsed.repository);
        let tag = parsed
            .digest
            .clone()
            .or(parsed.tag.clone())
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(image = %reference, "Pulling image");

        let options = CreateImageOptions {
            from_image: from_image.as_str(),
            tag: tag.as_str(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| engine_error("pull image", e))?;
            if let Some(detail) = info.error_detail.and_then(|d| d.message) {
                return Err(ShimError::engine("pull image", detail));
            }
            if let Some(status) = info.status {
                tracing::debug!(image = %reference, status = %status, "Pull progress");
            }
        }
        Ok(())
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Map the result of a start or stop call. The engine answers 304 when the
/// container is already in the requested state, which is not a failure.
fn state_change_result(
    context: &str,
    result: std::result::Result<(), bollard::errors::Error>,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        }) => Ok(()),
        Err(e) => Err(map_error(context, e)),
    }
}

/// Map a bollard error into the shim's error kinds.
fn map_error(context: &str, err: bollard::errors::Error) -> ShimError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => ShimError::UnknownHandle(message),
        bollard::errors::Error::IOError { err } => ShimError::ConnectionError(err.to_string()),
        other => engine_error(context, other),
    }
}

/// Like [`map_error`], for calls where a 404 concerns something other than
/// the handle the caller passed (a registry manifest, a vanished image).
fn engine_error(context: &str, err: bollard::errors::Error) -> ShimError {
    match err {
        bollard::errors::Error::DockerResponseServerError { message, .. } => {
            ShimError::engine(context, message)
        }
        bollard::errors::Error::IOError { err } => ShimError::ConnectionError(err.to_string()),
        other => ShimError::engine(context, other),
    }
}

fn to_details(image: ImageInspect) -> ImageDetails {
    let config = image.config.unwrap_or_default();

    ImageDetails {
        id: image.id.unwrap_or_default(),
        repo_tags: image.repo_tags.unwrap_or_default(),
        repo_digests: image.repo_digests.unwrap_or_default(),
        size: image.size.unwrap_or(0).max(0) as u64,
        entrypoint: config.entrypoint.unwrap_or_default(),
        cmd: config.cmd.unwrap_or_default(),
    }
}

/// Parse an RFC 3339 engine timestamp into nanoseconds; unset or zero
/// timestamps ("0001-01-01T00:00:00Z") become 0.
fn parse_timestamp(value: Option<&str>) -> i64 {
    value
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok())
        .and_then(|t| t.timestamp_nanos_opt())
        .filter(|ns| *ns > 0)
        .unwrap_or(0)
}

fn to_state(status: Option<ContainerStateStatusEnum>) -> ContainerState {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
        Some(ContainerStateStatusEnum::RUNNING)
        | Some(ContainerStateStatusEnum::PAUSED)
        | Some(ContainerStateStatusEnum::RESTARTING) => ContainerState::Running,
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            ContainerState::Exited
        }
        _ => ContainerState::Unknown,
    }
}

fn to_config(descriptor: &ContainerDescriptor) -> Config<String> {
    let env: Vec<String> = descriptor
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let host_config = HostConfig {
        network_mode: (!descriptor.network.is_empty()).then(|| descriptor.network.clone()),
        userns_mode: descriptor.id_mappings.userns_mode.clone(),
        ..Default::default()
    };

    Config {
        image: Some(descriptor.image_id.clone()),
        entrypoint: descriptor.entrypoint.clone(),
        cmd: (!descriptor.command.is_empty()).then(|| descriptor.command.clone()),
        env: (!env.is_empty()).then_some(env),
        working_dir: Some(descriptor.work_dir.clone()),
        labels: (!descriptor.labels.is_empty()).then(|| descriptor.labels.clone()),
        stop_signal: Some(descriptor.stop_signal.clone()),
        attach_stdin: Some(!descriptor.detach),
        attach_stdout: Some(!descriptor.detach),
        attach_stderr: Some(!descriptor.detach),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ensure_image(&self, reference: &str) -> Result<PulledImage> {
        let image = match self.inspect(reference).await? {
            Some(image) => image,
            None => {
                self.pull(reference).await?;
                self.inspect(reference).await?.ok_or_else(|| {
                    ShimError::engine("pull image", format!("{} missing after pull", reference))
                })?
            }
        };

        Ok(PulledImage {
            id: image.id.unwrap_or_default(),
            input_name: reference.to_string(),
        })
    }

    async fn inspect_image(&self, image_id: &str) -> Result<ImageDetails> {
        self.docker
            .inspect_image(image_id)
            .await
            .map(to_details)
            .map_err(|e| map_error("inspect image", e))
    }

    async fn find_image(&self, reference: &str) -> Result<Option<ImageDetails>> {
        Ok(self.inspect(reference).await?.map(to_details))
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.docker
            .remove_image(reference, Some(options), None)
            .await
            .map(|_| ())
            .map_err(|e| map_error("remove image", e))
    }

    fn build_id_mappings(&self, options: &IdMappingOptions) -> Result<IdMappingSet> {
        let set = IdMappingSet::parse(options)?;
        if !set.uid_map.is_empty() || !set.gid_map.is_empty() {
            return Err(ShimError::engine(
                "build ID mappings",
                "explicit uid/gid maps are not supported over the Docker API, use userns_mode",
            ));
        }
        Ok(set)
    }

    async fn create_container(&self, descriptor: ContainerDescriptor) -> Result<String> {
        let options = descriptor.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, to_config(&descriptor))
            .await
            .map_err(|e| engine_error("create container", e))?;

        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, warning = %warning, "Engine warning");
        }

        Ok(response.id)
    }

    async fn get_container(&self, id: &str) -> Result<ContainerRef> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error("inspect container", e))?;

        let state = info.state.unwrap_or_default();
        Ok(ContainerRef {
            id: info.id.unwrap_or_else(|| id.to_string()),
            image: info.config.and_then(|c| c.image).unwrap_or_default(),
            image_id: info.image.unwrap_or_default(),
            state: to_state(state.status),
            created_at: parse_timestamp(info.created.as_deref()),
            started_at: parse_timestamp(state.started_at.as_deref()),
            finished_at: parse_timestamp(state.finished_at.as_deref()),
            exit_code: state.exit_code.unwrap_or(0) as i32,
        })
    }

    async fn start(&self, id: &str, attach: bool) -> Result<()> {
        if attach {
            return Err(ShimError::engine(
                "start container",
                "attaching to container I/O is not supported",
            ));
        }

        let result = self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await;
        state_change_result("start container", result)
    }

    async fn stop(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let options = timeout.map(|t| StopContainerOptions {
            t: t.as_secs() as i64,
        });

        let result = self.docker.stop_container(id, options).await;
        state_change_result("stop container", result)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_error("remove container", e))
    }

    async fn version(&self) -> Result<EngineVersion> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| map_error("engine version", e))?;

        let name = version
            .components
            .as_ref()
            .and_then(|c| c.first())
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "docker".to_string());

        Ok(EngineVersion {
            name,
            version: version.version.unwrap_or_default(),
        })
    }
}
