//! Collaborator contracts
//!
//! The build pipeline talks to the outside world only through these traits,
//! so each collaborator can be replaced independently (production adapters
//! live in `shipflow-build`, tests substitute recording fakes).

use crate::error::{DownloadError, EngineError, PrepareError, RegistryError};
use crate::model::{
    ArtifactCoordinates, AuroraVersion, BaseImage, BuildSpecification, Deliverable, DockerImage,
    ExistingTags, ImageInfo, RegistryCredentials, RepositoryAccess, RunConfig,
};
use async_trait::async_trait;
use std::path::Path;

/// Fetches the deliverable from the artifact repository.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download_artifact(
        &self,
        coordinates: &ArtifactCoordinates,
        access: &RepositoryAccess,
    ) -> Result<Deliverable, DownloadError>;
}

/// Produces the build contexts (Dockerfile and payload) for one run.
#[async_trait]
pub trait Prepper: Send + Sync {
    /// Returns the ordered build specifications for this run
    async fn prepare(
        &self,
        config: &RunConfig,
        version: &AuroraVersion,
        deliverable: &Deliverable,
        base_image: &BaseImage,
    ) -> Result<Vec<BuildSpecification>, PrepareError>;
}

/// Container engine facade.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn pull(&self, image: &DockerImage) -> Result<(), EngineError>;

    /// Builds the context folder and returns the opaque image id
    async fn build(&self, build_folder: &Path) -> Result<String, EngineError>;

    async fn tag(&self, image_id: &str, tag: &str) -> Result<(), EngineError>;

    /// Pushes every fully-qualified tag of the image in one call
    async fn push(
        &self,
        image_id: &str,
        tags: &[String],
        credentials: Option<&RegistryCredentials>,
    ) -> Result<(), EngineError>;
}

/// Registry metadata lookups.
#[async_trait]
pub trait ImageInfoProvider: Send + Sync {
    async fn get_image_info(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<ImageInfo, RegistryError>;

    async fn get_image_config(
        &self,
        repository: &str,
        digest: &str,
    ) -> Result<serde_json::Value, RegistryError>;

    /// Lists current tags. A repository that does not exist yet has no tags.
    async fn get_tags(&self, repository: &str) -> Result<ExistingTags, RegistryError>;
}

/// Best-effort provenance sink.
///
/// There is no error channel: implementations log and drop failures, so a
/// sink outage can never change the outcome of a build.
#[async_trait]
pub trait Tracer: Send + Sync {
    async fn add_image_metadata(&self, kind: &str, payload: serde_json::Value);
}

/// Tracer used when no trace endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

#[async_trait]
impl Tracer for NoopTracer {
    async fn add_image_metadata(&self, kind: &str, _payload: serde_json::Value) {
        tracing::debug!("Tracing disabled, dropping {} metadata", kind);
    }
}
