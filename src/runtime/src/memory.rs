//! In-process container engine.
//!
//! Tracks images and containers in memory without running anything. Used by
//! tests and by `--engine memory` dry runs of the CRI surface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use podshim_core::{
    ContainerDescriptor, ContainerEngine, ContainerRef, ContainerState, EngineVersion,
    IdMappingOptions, IdMappingSet, ImageDetails, PulledImage, Result, ShimError,
};

use crate::reference::ImageReference;

/// Command reported for images without an explicit one.
const DEFAULT_IMAGE_COMMAND: &[&str] = &["/bin/sh"];

/// Size reported for every image.
const FAKE_IMAGE_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
struct MemoryImage {
    id: String,
    reference: String,
    cmd: Vec<String>,
}

#[derive(Debug, Clone)]
struct MemoryContainer {
    info: ContainerRef,
    name: Option<String>,
    descriptor: ContainerDescriptor,
    last_stop_timeout: Option<Duration>,
}

/// In-memory [`ContainerEngine`].
pub struct MemoryEngine {
    /// Normalized reference → image.
    images: Arc<RwLock<HashMap<String, MemoryImage>>>,
    /// Container id → container.
    containers: Arc<RwLock<HashMap<String, MemoryContainer>>>,
    /// Normalized references whose pull always fails.
    unpullable: HashSet<String>,
    /// Normalized reference → configured default command.
    commands: HashMap<String, Vec<String>>,
}

impl MemoryEngine {
    /// Create an empty engine where every well-formed reference pulls.
    pub fn new() -> Self {
        Self {
            images: Arc::new(RwLock::new(HashMap::new())),
            containers: Arc::new(RwLock::new(HashMap::new())),
            unpullable: HashSet::new(),
            commands: HashMap::new(),
        }
    }

    /// Make pulls of `reference` fail as if the registry rejected it.
    pub fn with_unpullable(mut self, reference: &str) -> Self {
        self.unpullable.insert(normalize(reference));
        self
    }

    /// Set the CMD reported when inspecting `reference`.
    pub fn with_image_command(mut self, reference: &str, command: &[&str]) -> Self {
        self.commands.insert(
            normalize(reference),
            command.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// The descriptor a container was created from.
    pub async fn descriptor(&self, id: &str) -> Option<ContainerDescriptor> {
        self.containers
            .read()
            .await
            .get(id)
            .map(|c| c.descriptor.clone())
    }

    /// Grace period passed to the most recent stop of a container.
    pub async fn last_stop_timeout(&self, id: &str) -> Option<Duration> {
        self.containers
            .read()
            .await
            .get(id)
            .and_then(|c| c.last_stop_timeout)
    }

    /// Number of containers currently known.
    pub async fn container_count(&self) -> usize {
        self.containers.read().await.len()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(reference: &str) -> String {
    ImageReference::parse(reference)
        .map(|r| r.to_string())
        .unwrap_or_else(|_| reference.trim().to_string())
}

fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

fn details(image: &MemoryImage) -> ImageDetails {
    ImageDetails {
        id: image.id.clone(),
        repo_tags: vec![image.reference.clone()],
        repo_digests: vec![format!("{}@{}", image.reference, image.id)],
        size: FAKE_IMAGE_SIZE,
        entrypoint: Vec::new(),
        cmd: image.cmd.clone(),
    }
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    async fn ensure_image(&self, reference: &str) -> Result<PulledImage> {
        let parsed = ImageReference::parse(reference)
            .map_err(|e| ShimError::engine("pull image", e))?;
        let key = parsed.to_string();

        if self.unpullable.contains(&key) {
            return Err(ShimError::engine(
                "pull image",
                format!("{}: manifest unknown", reference),
            ));
        }

        let mut images = self.images.write().await;
        let image = images.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(image = %key, "Pulling image into memory engine");
            MemoryImage {
                id: format!("sha256:{}", uuid::Uuid::new_v4().simple()),
                reference: key.clone(),
                cmd: self.commands.get(&key).cloned().unwrap_or_else(|| {
                    DEFAULT_IMAGE_COMMAND.iter().map(|s| s.to_string()).collect()
                }),
            }
        });

        Ok(PulledImage {
            id: image.id.clone(),
            input_name: reference.to_string(),
        })
    }

    async fn inspect_image(&self, image_id: &str) -> Result<ImageDetails> {
        let images = self.images.read().await;
        images
            .values()
            .find(|img| img.id == image_id)
            .map(details)
            .ok_or_else(|| ShimError::UnknownHandle(format!("image {}", image_id)))
    }

    async fn find_image(&self, reference: &str) -> Result<Option<ImageDetails>> {
        let images = self.images.read().await;
        if let Some(image) = images.get(&normalize(reference)) {
            return Ok(Some(details(image)));
        }
        Ok(images.values().find(|img| img.id == reference).map(details))
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        let key = {
            let images = self.images.read().await;
            let normalized = normalize(reference);
            if images.contains_key(&normalized) {
                normalized
            } else {
                images
                    .iter()
                    .find(|(_, img)| img.id == reference)
                    .map(|(k, _)| k.clone())
                    .ok_or_else(|| ShimError::UnknownHandle(format!("image {}", reference)))?
            }
        };

        let mut images = self.images.write().await;
        let image_id = match images.get(&key) {
            Some(img) => img.id.clone(),
            None => return Err(ShimError::UnknownHandle(format!("image {}", reference))),
        };

        if let Some(user) = self
            .containers
            .read()
            .await
            .values()
            .find(|c| c.info.image_id == image_id)
        {
            return Err(ShimError::engine(
                "remove image",
                format!("image {} is in use by container {}", reference, user.info.id),
            ));
        }

        images.remove(&key);
        Ok(())
    }

    fn build_id_mappings(&self, options: &IdMappingOptions) -> Result<IdMappingSet> {
        IdMappingSet::parse(options)
    }

    async fn create_container(&self, descriptor: ContainerDescriptor) -> Result<String> {
        let image_known = self
            .images
            .read()
            .await
            .values()
            .any(|img| img.id == descriptor.image_id);
        if !image_known {
            return Err(ShimError::engine(
                "create container",
                format!("image {} is not present", descriptor.image),
            ));
        }

        let mut containers = self.containers.write().await;
        if let Some(name) = &descriptor.name {
            if containers.values().any(|c| c.name.as_ref() == Some(name)) {
                return Err(ShimError::engine(
                    "create container",
                    format!("container name {} is already in use", name),
                ));
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let container = MemoryContainer {
            info: ContainerRef {
                id: id.clone(),
                image: descriptor.image.clone(),
                image_id: descriptor.image_id.clone(),
                state: ContainerState::Created,
                created_at: now_ns(),
                started_at: 0,
                finished_at: 0,
                exit_code: 0,
            },
            name: descriptor.name.clone(),
            descriptor,
            last_stop_timeout: None,
        };
        containers.insert(id.clone(), container);

        Ok(id)
    }

    async fn get_container(&self, id: &str) -> Result<ContainerRef> {
        self.containers
            .read()
            .await
            .get(id)
            .map(|c| c.info.clone())
            .ok_or_else(|| ShimError::UnknownHandle(format!("container {}", id)))
    }

    async fn start(&self, id: &str, attach: bool) -> Result<()> {
        if attach {
            return Err(ShimError::engine(
                "start container",
                "attaching to container I/O is not supported",
            ));
        }

        let mut containers = self.containers.write().await;
        let container = containers
            .get_mut(id)
            .ok_or_else(|| ShimError::UnknownHandle(format!("container {}", id)))?;

        if container.info.state != ContainerState::Running {
            container.info.state = ContainerState::Running;
            container.info.started_at = now_ns();
            container.info.finished_at = 0;
        }
        Ok(())
    }

    async fn stop(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let mut containers = self.containers.write().await;
        let container = containers
            .get_mut(id)
            .ok_or_else(|| ShimError::UnknownHandle(format!("container {}", id)))?;

        container.last_stop_timeout = timeout;
        // Stopping a container that is not running is a no-op.
        if container.info.state == ContainerState::Running {
            container.info.state = ContainerState::Exited;
            container.info.finished_at = now_ns();
            container.info.exit_code = 0;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.containers
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ShimError::UnknownHandle(format!("container {}", id)))
    }

    async fn version(&self) -> Result<EngineVersion> {
        Ok(EngineVersion {
            name: "memory".to_string(),
            version: crate::VERSION.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(pulled: &PulledImage) -> ContainerDescriptor {
        ContainerDescriptor {
            name: None,
            entrypoint: None,
            command: vec!["/hello".to_string()],
            detach: true,
            env: vec![],
            labels: HashMap::new(),
            id_mappings: IdMappingSet::default(),
            image: pulled.input_name.clone(),
            image_id: pulled.id.clone(),
            network: String::new(),
            work_dir: "/".to_string(),
            stop_signal: "SIGTERM".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ensure_image_echoes_input_name() {
        let engine = MemoryEngine::new();
        let pulled = engine
            .ensure_image("docker.io/library/alpine:latest")
            .await
            .unwrap();
        assert_eq!(pulled.input_name, "docker.io/library/alpine:latest");
        assert!(pulled.id.starts_with("sha256:"));
    }

    #[tokio::test]
    async fn test_ensure_image_pulls_once() {
        let engine = MemoryEngine::new();
        let first = engine.ensure_image("alpine").await.unwrap();
        let second = engine
            .ensure_image("docker.io/library/alpine:latest")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.input_name, "docker.io/library/alpine:latest");
    }

    #[tokio::test]
    async fn test_unpullable_image() {
        let engine = MemoryEngine::new().with_unpullable("example.com/missing:1");
        let err = engine.ensure_image("example.com/missing:1").await.unwrap_err();
        assert!(matches!(err, ShimError::EngineError { .. }));
        assert!(engine.find_image("example.com/missing:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inspect_reports_configured_command() {
        let engine = MemoryEngine::new().with_image_command("hello-world", &["/hello"]);
        let pulled = engine.ensure_image("hello-world").await.unwrap();
        let details = engine.inspect_image(&pulled.id).await.unwrap();
        assert!(details.entrypoint.is_empty());
        assert_eq!(details.cmd, vec!["/hello".to_string()]);
        assert_eq!(
            details.repo_tags,
            vec!["docker.io/library/hello-world:latest".to_string()]
        );
    }

    #[tokio::test]
    async fn test_inspect_unknown_image() {
        let engine = MemoryEngine::new();
        let err = engine.inspect_image("sha256:nope").await.unwrap_err();
        assert!(matches!(err, ShimError::UnknownHandle(_)));
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let engine = MemoryEngine::new();
        let pulled = engine.ensure_image("hello-world").await.unwrap();
        let id = engine.create_container(descriptor(&pulled)).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(
            engine.get_container(&id).await.unwrap().state,
            ContainerState::Created
        );

        engine.start(&id, false).await.unwrap();
        let running = engine.get_container(&id).await.unwrap();
        assert_eq!(running.state, ContainerState::Running);
        assert!(running.started_at > 0);

        engine.stop(&id, Some(Duration::from_secs(5))).await.unwrap();
        let exited = engine.get_container(&id).await.unwrap();
        assert_eq!(exited.state, ContainerState::Exited);
        assert_eq!(
            engine.last_stop_timeout(&id).await,
            Some(Duration::from_secs(5))
        );

        engine.remove_container(&id).await.unwrap();
        assert_eq!(engine.container_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let engine = MemoryEngine::new();
        let pulled = engine.ensure_image("hello-world").await.unwrap();
        let id = engine.create_container(descriptor(&pulled)).await.unwrap();

        engine.stop(&id, None).await.unwrap();
        engine.stop(&id, None).await.unwrap();
        assert_eq!(
            engine.get_container(&id).await.unwrap().state,
            ContainerState::Created
        );
    }

    #[tokio::test]
    async fn test_unknown_container() {
        let engine = MemoryEngine::new();
        assert!(matches!(
            engine.start("missing", false).await.unwrap_err(),
            ShimError::UnknownHandle(_)
        ));
        assert!(matches!(
            engine.stop("missing", None).await.unwrap_err(),
            ShimError::UnknownHandle(_)
        ));
        assert!(matches!(
            engine.remove_container("missing").await.unwrap_err(),
            ShimError::UnknownHandle(_)
        ));
    }

    #[tokio::test]
    async fn test_attach_not_supported() {
        let engine = MemoryEngine::new();
        let pulled = engine.ensure_image("hello-world").await.unwrap();
        let id = engine.create_container(descriptor(&pulled)).await.unwrap();
        assert!(engine.start(&id, true).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let engine = MemoryEngine::new();
        let pulled = engine.ensure_image("hello-world").await.unwrap();
        let mut desc = descriptor(&pulled);
        desc.name = Some("web_0".to_string());
        engine.create_container(desc.clone()).await.unwrap();
        assert!(engine.create_container(desc).await.is_err());
    }

    #[tokio::test]
    async fn test_create_with_unknown_image_id() {
        let engine = MemoryEngine::new();
        let pulled = PulledImage {
            id: "sha256:unknown".to_string(),
            input_name: "ghost".to_string(),
        };
        let err = engine.create_container(descriptor(&pulled)).await.unwrap_err();
        assert!(matches!(err, ShimError::EngineError { .. }));
    }

    #[tokio::test]
    async fn test_remove_image_in_use() {
        let engine = MemoryEngine::new();
        let pulled = engine.ensure_image("hello-world").await.unwrap();
        let id = engine.create_container(descriptor(&pulled)).await.unwrap();

        assert!(engine.remove_image("hello-world").await.is_err());
        engine.remove_container(&id).await.unwrap();
        engine.remove_image("hello-world").await.unwrap();
        assert!(engine.find_image("hello-world").await.unwrap().is_none());
        assert!(matches!(
            engine.remove_image("hello-world").await.unwrap_err(),
            ShimError::UnknownHandle(_)
        ));
    }

    #[tokio::test]
    async fn test_find_image_by_id() {
        let engine = MemoryEngine::new();
        let pulled = engine.ensure_image("alpine").await.unwrap();
        let found = engine.find_image(&pulled.id).await.unwrap().unwrap();
        assert_eq!(found.id, pulled.id);
    }
}
