//! CRI ImageService implementation.
//!
//! Every call is forwarded to the shared container engine; the only policy
//! here is pull-if-missing for `PullImage`.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use podshim_core::{ContainerEngine, ImageDetails, ShimError};

use crate::cri_api::image_service_server::ImageService;
use crate::cri_api::*;
use crate::error::shim_error_to_status;

/// CRI ImageService over a container engine.
pub struct ShimImageService {
    engine: Arc<dyn ContainerEngine>,
}

impl ShimImageService {
    /// Create a new ShimImageService.
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }
}

/// Extract a non-empty image reference from an optional spec.
pub(crate) fn require_image(spec: Option<ImageSpec>) -> Result<String, Status> {
    match spec {
        Some(spec) if !spec.image.trim().is_empty() => Ok(spec.image),
        _ => Err(shim_error_to_status(ShimError::ValidationError(
            "image spec required".to_string(),
        ))),
    }
}

fn to_cri_image(details: ImageDetails, reference: String) -> Image {
    Image {
        id: details.id,
        repo_tags: details.repo_tags,
        repo_digests: details.repo_digests,
        size: details.size,
        uid: None,
        username: String::new(),
        spec: Some(ImageSpec {
            image: reference,
            annotations: Default::default(),
        }),
        pinned: false,
    }
}

#[tonic::async_trait]
impl ImageService for ShimImageService {
    async fn pull_image(
        &self,
        request: Request<PullImageRequest>,
    ) -> Result<Response<PullImageResponse>, Status> {
        let req = request.into_inner();
        let image = require_image(req.image)?;

        tracing::info!(image = %image, "CRI PullImage");

        let pulled = self
            .engine
            .ensure_image(&image)
            .await
            .map_err(|e| shim_error_to_status(e.within("pull image")))?;

        tracing::debug!(image = %image, image_id = %pulled.id, "Image present");

        Ok(Response::new(PullImageResponse {
            image_ref: pulled.input_name,
        }))
    }

    async fn image_status(
        &self,
        request: Request<ImageStatusRequest>,
    ) -> Result<Response<ImageStatusResponse>, Status> {
        let req = request.into_inner();
        let image = require_image(req.image)?;

        let found = self
            .engine
            .find_image(&image)
            .await
            .map_err(|e| shim_error_to_status(e.within("image status")))?;

        Ok(Response::new(ImageStatusResponse {
            image: found.map(|details| to_cri_image(details, image)),
            info: Default::default(),
        }))
    }

    async fn remove_image(
        &self,
        request: Request<RemoveImageRequest>,
    ) -> Result<Response<RemoveImageResponse>, Status> {
        let req = request.into_inner();
        let image = require_image(req.image)?;

        tracing::info!(image = %image, "CRI RemoveImage");

        match self.engine.remove_image(&image).await {
            Ok(()) | Err(ShimError::UnknownHandle(_)) => Ok(Response::new(RemoveImageResponse {})),
            Err(e) => Err(shim_error_to_status(e.within("remove image"))),
        }
    }
}
