use async_trait::async_trait;
use shipflow_build::{BuildPipeline, Collaborators};
use shipflow_core::{
    ArtifactCoordinates, AuroraVersion, BaseImage, BaseImageSpec, Builder, BuildSpecification,
    Deliverable, DockerImage, DockerSpec, DownloadError, Downloader, EngineError, ExistingTags,
    ExtraTags, ImageInfo, ImageInfoProvider, PrepareError, Prepper, RegistryCredentials,
    RegistryError, RepositoryAccess, RunConfig, Tracer,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const OUTPUT_REGISTRY: &str = "registry.example.com:5000";
pub const OUTPUT_REPOSITORY: &str = "org.example.demo/demo-app";
pub const BASE_REPOSITORY: &str = "aurora/wingnut11";
pub const COMPLETE_VERSION: &str = "1.2.3-b1.5.0-wingnut11-1.3.7";
pub const IMAGE_ID: &str = "sha256:0123456789abcdef";
pub const DELIVERABLE_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

/// 全コラボレータの呼び出しを順に記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Download,
    GetImageInfo { repository: String, reference: String },
    GetImageConfig { repository: String },
    GetTags { repository: String },
    Prepare,
    Pull(String),
    Build(PathBuf),
    Tag(String),
    Push(Vec<String>),
    Trace(String),
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn tags(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Tag(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn pushes(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Push(tags) => Some(tags),
                _ => None,
            })
            .collect()
    }

    pub fn traces(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Trace(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// 既存タグを問い合わせたリポジトリ (順序通り)
    pub fn queried_repositories(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::GetTags { repository } => Some(repository),
                _ => None,
            })
            .collect()
    }

    pub fn engine_calls(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                Call::Pull(_) | Call::Build(_) | Call::Tag(_) | Call::Push(_)
            )
        })
    }
}

struct FakeDownloader {
    log: CallLog,
    fail: bool,
    resolved_version: Option<String>,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download_artifact(
        &self,
        coordinates: &ArtifactCoordinates,
        _access: &RepositoryAccess,
    ) -> Result<Deliverable, DownloadError> {
        self.log.record(Call::Download);
        if self.fail {
            return Err(DownloadError::NotFound(coordinates.to_string()));
        }
        let deliverable = Deliverable::new("/tmp/demo-app.zip", DELIVERABLE_SHA1);
        Ok(match &self.resolved_version {
            Some(version) => deliverable.with_resolved_version(version.clone()),
            None => deliverable,
        })
    }
}

struct FakePrepper {
    log: CallLog,
    fail: bool,
    repositories: Vec<String>,
    work_dir: PathBuf,
}

#[async_trait]
impl Prepper for FakePrepper {
    async fn prepare(
        &self,
        config: &RunConfig,
        version: &AuroraVersion,
        _deliverable: &Deliverable,
        base_image: &BaseImage,
    ) -> Result<Vec<BuildSpecification>, PrepareError> {
        self.log.record(Call::Prepare);
        if self.fail {
            return Err(PrepareError::Template("unexpected end of template".to_string()));
        }
        let repositories = if self.repositories.is_empty() {
            vec![config.docker.output_repository.clone()]
        } else {
            self.repositories.clone()
        };
        Ok(repositories
            .into_iter()
            .enumerate()
            .map(|(i, repository)| BuildSpecification {
                base_image: base_image.image.clone(),
                build_folder: self.work_dir.join(format!("build-{}", i)),
                repository,
                version: version.clone(),
            })
            .collect())
    }
}

struct FakeBuilder {
    log: CallLog,
    build_delay: Option<Duration>,
    fail_push: bool,
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn pull(&self, image: &DockerImage) -> Result<(), EngineError> {
        self.log.record(Call::Pull(image.to_string()));
        Ok(())
    }

    async fn build(&self, build_folder: &Path) -> Result<String, EngineError> {
        self.log.record(Call::Build(build_folder.to_path_buf()));
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(IMAGE_ID.to_string())
    }

    async fn tag(&self, _image_id: &str, tag: &str) -> Result<(), EngineError> {
        self.log.record(Call::Tag(tag.to_string()));
        Ok(())
    }

    async fn push(
        &self,
        _image_id: &str,
        tags: &[String],
        _credentials: Option<&RegistryCredentials>,
    ) -> Result<(), EngineError> {
        self.log.record(Call::Push(tags.to_vec()));
        if self.fail_push {
            return Err(EngineError::PushFailed {
                message: "denied: requested access to the resource is denied".to_string(),
            });
        }
        Ok(())
    }
}

struct FakeRegistry {
    log: CallLog,
    existing_tags: Vec<String>,
    tags_by_repository: HashMap<String, Vec<String>>,
    fail_image_config: bool,
}

#[async_trait]
impl ImageInfoProvider for FakeRegistry {
    async fn get_image_info(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<ImageInfo, RegistryError> {
        self.log.record(Call::GetImageInfo {
            repository: repository.to_string(),
            reference: reference.to_string(),
        });
        let complete_base_image_version = if repository == BASE_REPOSITORY {
            "1.3.7".to_string()
        } else {
            reference.to_string()
        };
        Ok(ImageInfo {
            digest: format!("sha256:{}", repository.replace('/', "-")),
            complete_base_image_version,
            ..Default::default()
        })
    }

    async fn get_image_config(
        &self,
        repository: &str,
        _digest: &str,
    ) -> Result<serde_json::Value, RegistryError> {
        self.log.record(Call::GetImageConfig {
            repository: repository.to_string(),
        });
        if self.fail_image_config {
            return Err(RegistryError::Request {
                url: format!("https://{}/v2/{}/blobs", OUTPUT_REGISTRY, repository),
                message: "connection reset".to_string(),
            });
        }
        Ok(serde_json::json!({ "architecture": "amd64", "os": "linux" }))
    }

    async fn get_tags(&self, repository: &str) -> Result<ExistingTags, RegistryError> {
        self.log.record(Call::GetTags {
            repository: repository.to_string(),
        });
        let tags = self
            .tags_by_repository
            .get(repository)
            .unwrap_or(&self.existing_tags);
        Ok(ExistingTags {
            name: repository.to_string(),
            tags: tags.clone(),
        })
    }
}

/// 送信内容を記録するトレーサ
pub struct RecordingTracer {
    log: CallLog,
    pub payloads: Mutex<Vec<serde_json::Value>>,
    /// deployableImage の送信で応答しなくなるまでの遅延
    pub deployable_delay: Mutex<Option<Duration>>,
}

#[async_trait]
impl Tracer for RecordingTracer {
    async fn add_image_metadata(&self, kind: &str, payload: serde_json::Value) {
        self.log.record(Call::Trace(kind.to_string()));
        self.payloads.lock().unwrap().push(payload);

        let delay = *self.deployable_delay.lock().unwrap();
        if kind == shipflow_build::DEPLOYABLE_IMAGE_TRACE
            && let Some(delay) = delay
        {
            tokio::time::sleep(delay).await;
        }
    }
}

/// パイプラインとフェイクをまとめたテスト環境
pub struct Harness {
    pub log: CallLog,
    pub config: RunConfig,
    pub existing_tags: Vec<String>,
    /// リポジトリごとの既存タグ (なければ existing_tags)
    pub tags_by_repository: HashMap<String, Vec<String>>,
    pub resolved_version: Option<String>,
    pub repositories: Vec<String>,
    pub fail_download: bool,
    pub fail_prepare: bool,
    pub fail_push: bool,
    pub fail_image_config: bool,
    pub build_delay: Option<Duration>,
    pub tracer: Arc<RecordingTracer>,
    work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let log = CallLog::default();
        Self {
            config: default_config(),
            existing_tags: Vec::new(),
            tags_by_repository: HashMap::new(),
            resolved_version: None,
            repositories: Vec::new(),
            fail_download: false,
            fail_prepare: false,
            fail_push: false,
            fail_image_config: false,
            build_delay: None,
            tracer: Arc::new(RecordingTracer {
                log: log.clone(),
                payloads: Mutex::new(Vec::new()),
                deployable_delay: Mutex::new(None),
            }),
            log,
            work_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn pipeline(&self) -> BuildPipeline {
        let collaborators = Collaborators {
            downloader: Arc::new(FakeDownloader {
                log: self.log.clone(),
                fail: self.fail_download,
                resolved_version: self.resolved_version.clone(),
            }),
            prepper: Arc::new(FakePrepper {
                log: self.log.clone(),
                fail: self.fail_prepare,
                repositories: self.repositories.clone(),
                work_dir: self.work_dir.path().to_path_buf(),
            }),
            builder: Arc::new(FakeBuilder {
                log: self.log.clone(),
                build_delay: self.build_delay,
                fail_push: self.fail_push,
            }),
            provider: Arc::new(FakeRegistry {
                log: self.log.clone(),
                existing_tags: self.existing_tags.clone(),
                tags_by_repository: self.tags_by_repository.clone(),
                fail_image_config: self.fail_image_config,
            }),
            tracer: self.tracer.clone(),
        };
        BuildPipeline::new(self.config.clone(), collaborators)
    }
}

pub fn default_config() -> RunConfig {
    RunConfig {
        application: ArtifactCoordinates {
            group_id: "org.example.demo".to_string(),
            artifact_id: "demo-app".to_string(),
            version: "1.2.3".to_string(),
            classifier: Some("leveransepakke".to_string()),
            ..Default::default()
        },
        base_image: BaseImageSpec {
            repository: BASE_REPOSITORY.to_string(),
            version: "1".to_string(),
        },
        docker: DockerSpec {
            output_registry: OUTPUT_REGISTRY.to_string(),
            output_repository: OUTPUT_REPOSITORY.to_string(),
            internal_pull_registry: "https://internal.example.com:5000".to_string(),
            push_extra_tags: ExtraTags::default(),
            ..Default::default()
        },
        builder_version: "1.5.0".to_string(),
        ..Default::default()
    }
}

/// `registry/repository:name`
pub fn qualified(name: &str) -> String {
    format!("{}/{}:{}", OUTPUT_REGISTRY, OUTPUT_REPOSITORY, name)
}
