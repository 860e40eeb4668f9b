//! Shipflow build pipeline
//!
//! This crate drives one build run: download the deliverable, derive the
//! Aurora version, prepare build contexts, guard against overwriting a
//! released version, then pull, build, tag and push each image and record
//! provenance. It also provides the production collaborators (Docker engine,
//! registry v2 client, Maven repository downloader, Dockerfile prepper and
//! HTTP tracer).

pub mod auth;
pub mod cancel;
pub mod context;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod nexus;
pub mod pipeline;
pub mod prepare;
pub mod progress;
pub mod registry;
pub mod trace;

pub use auth::RegistryAuth;
pub use cancel::{CancelHandle, Cancellation};
pub use context::ContextBuilder;
pub use engine::{DockerBuilder, validate_tag};
pub use error::{EngineOperation, PipelineError, PipelineResult, Stage};
pub use metadata::{Dependency, DeployableImageMetadata, extract_dependency_metadata};
pub use nexus::NexusDownloader;
pub use pipeline::{
    BASE_IMAGE_TRACE, BuildPipeline, BuildReport, Collaborators, DEPLOYABLE_IMAGE_TRACE,
    ImageReport,
};
pub use prepare::DockerfilePrepper;
pub use registry::RegistryClient;
pub use trace::HttpTracer;
