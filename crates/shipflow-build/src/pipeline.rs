//! ビルドパイプライン
//!
//! 1回の実行で次の順に1度だけ処理します:
//!
//! ```text
//! Start → Downloaded → VersionDerived → Prepared → CollisionChecked
//!       → (Pulled → Built → Tagged → Pushed → Traced)* → Done
//! ```
//!
//! どの段階でも失敗すると `Failed` に移り、最初のエラーを返して以降は実行しません。
//! ビルド仕様は順番に処理し、先の仕様でプッシュ済みのタグは巻き戻しません。

use crate::cancel::Cancellation;
use crate::error::{EngineOperation, PipelineError, PipelineResult, Stage};
use crate::metadata::{extract_dependency_metadata, Dependency, DeployableImageMetadata};
use shipflow_core::{
    ensure_not_published, qualify_repository, resolve_snapshot_timestamp_version, strip_scheme,
    AuroraVersion, BaseImage, Builder, BuildSpecification, Deliverable, DockerImage, Downloader,
    ImageInfoProvider, Prepper, RegistryCredentials, RunConfig, TagError, TagResolver, TagSet,
    Tracer,
};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// ベースイメージ設定のトレース種別
pub const BASE_IMAGE_TRACE: &str = "baseImage";
/// プッシュしたイメージのトレース種別
pub const DEPLOYABLE_IMAGE_TRACE: &str = "deployableImage";

/// 外部コラボレータ。個別に差し替え可能
#[derive(Clone)]
pub struct Collaborators {
    pub downloader: Arc<dyn Downloader>,
    pub prepper: Arc<dyn Prepper>,
    pub builder: Arc<dyn Builder>,
    pub provider: Arc<dyn ImageInfoProvider>,
    pub tracer: Arc<dyn Tracer>,
}

/// ビルド仕様1件分の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub repository: String,
    /// タグなしの `registry/repository`
    pub image: String,
    pub image_id: String,
    pub tags: TagSet,
    pub pushed: bool,
}

/// 成功した実行の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub version: AuroraVersion,
    pub images: Vec<ImageReport>,
}

/// コラボレータ呼び出しをキャンセルと実行期限で打ち切る
struct Guard<'a> {
    cancellation: &'a Cancellation,
    deadline: Instant,
}

impl Guard<'_> {
    async fn run<F: Future>(&self, stage: Stage, fut: F) -> PipelineResult<F::Output> {
        if self.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(PipelineError::Cancelled { stage }),
            _ = tokio::time::sleep_until(self.deadline) => Err(PipelineError::TimedOut { stage }),
            output = fut => Ok(output),
        }
    }

    /// 来歴送信用。期限切れは警告して `None`、キャンセルのみ伝播する
    async fn best_effort<F: Future>(&self, fut: F) -> PipelineResult<Option<F::Output>> {
        match self.run(Stage::Trace, fut).await {
            Ok(output) => Ok(Some(output)),
            Err(PipelineError::TimedOut { .. }) => {
                warn!("Deadline reached while recording provenance, skipping trace");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

pub struct BuildPipeline {
    config: RunConfig,
    collaborators: Collaborators,
    credentials: Option<RegistryCredentials>,
}

impl BuildPipeline {
    pub fn new(config: RunConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            credentials: None,
        }
    }

    /// プッシュ時にエンジンへ渡す認証情報
    pub fn with_credentials(mut self, credentials: Option<RegistryCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// パイプラインを1回実行
    ///
    /// 全体の期限はこの呼び出しからの `build_timeout`。
    pub async fn run(&self, cancellation: &Cancellation) -> PipelineResult<BuildReport> {
        let guard = Guard {
            cancellation,
            deadline: Instant::now() + self.config.build_timeout,
        };

        match self.execute(&guard).await {
            Ok(report) => {
                info!(images = report.images.len(), "Done building {}", report.version);
                Ok(report)
            }
            Err(e) => {
                error!(stage = %e.stage(), "Build failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(&self, guard: &Guard<'_>) -> PipelineResult<BuildReport> {
        let application = &self.config.application;

        info!("Download deliverable for {}", application);
        let deliverable = guard
            .run(
                Stage::Download,
                self.collaborators
                    .downloader
                    .download_artifact(application, &self.config.repository_access),
            )
            .await?
            .map_err(|source| PipelineError::Download {
                artifact: application.to_string(),
                source,
            })?;
        info!(sha1 = %deliverable.sha1, "Downloaded {}", deliverable.path.display());

        let base_image = self.resolve_base_image(guard).await?;

        let app_version = resolve_snapshot_timestamp_version(application, &deliverable)
            .map_err(|source| PipelineError::VersionResolution {
                artifact: application.to_string(),
                source,
            })?;
        let version = AuroraVersion::from_builder_and_base(
            app_version,
            application.is_snapshot(),
            application.version.as_str(),
            self.config.builder_version.as_str(),
            &base_image.image,
        );
        version
            .ensure_valid_tag()
            .map_err(|source| PipelineError::VersionResolution {
                artifact: application.to_string(),
                source,
            })?;
        info!(snapshot = version.is_snapshot(), "Derived version {}", version);

        let specifications = guard
            .run(
                Stage::Preparation,
                self.collaborators.prepper.prepare(
                    &self.config,
                    &version,
                    &deliverable,
                    &base_image,
                ),
            )
            .await?
            .map_err(|source| PipelineError::Preparation {
                version: version.complete_version(),
                source,
            })?;
        info!("Prepared {} build specification(s)", specifications.len());

        self.check_collisions(guard, &specifications).await?;

        let mut images = Vec::with_capacity(specifications.len());
        for specification in &specifications {
            images.push(self.build_image(guard, specification, &deliverable).await?);
        }

        Ok(BuildReport { version, images })
    }

    /// ベースイメージを引き、完全バージョンに固定する
    async fn resolve_base_image(&self, guard: &Guard<'_>) -> PipelineResult<BaseImage> {
        let spec = &self.config.base_image;
        let provider = &self.collaborators.provider;

        let info = guard
            .run(
                Stage::BaseImageLookup,
                provider.get_image_info(&spec.repository, &spec.version),
            )
            .await?
            .map_err(|source| PipelineError::RegistryQuery {
                stage: Stage::BaseImageLookup,
                repository: spec.repository.clone(),
                source,
            })?;

        if !self.config.no_push {
            match guard
                .best_effort(provider.get_image_config(&spec.repository, &info.digest))
                .await?
            {
                Some(Ok(config)) => {
                    guard
                        .best_effort(
                            self.collaborators
                                .tracer
                                .add_image_metadata(BASE_IMAGE_TRACE, config),
                        )
                        .await?;
                }
                Some(Err(e)) => warn!("Skipping base image trace for {}: {}", spec.repository, e),
                None => {}
            }
        }

        let image = DockerImage::new(
            strip_scheme(&self.config.docker.internal_pull_registry),
            spec.repository.as_str(),
            info.complete_base_image_version.as_str(),
        );
        info!("Base image {}", image);

        Ok(BaseImage { image, info })
    }

    /// リリース済みバージョンがあればイメージ処理の前に中止する
    ///
    /// 最初の衝突で止まり、後続の仕様は確認しません。
    /// `tag_overwrite` のときだけ省略します (固定タグ指定でも確認する)。
    async fn check_collisions(
        &self,
        guard: &Guard<'_>,
        specifications: &[BuildSpecification],
    ) -> PipelineResult<()> {
        let docker = &self.config.docker;
        if docker.tag_overwrite {
            return Ok(());
        }

        for specification in specifications {
            guard
                .run(
                    Stage::CollisionCheck,
                    ensure_not_published(
                        self.collaborators.provider.as_ref(),
                        &specification.repository,
                        &specification.version,
                    ),
                )
                .await?
                .map_err(|e| tag_error(Stage::CollisionCheck, e))?;
        }
        Ok(())
    }

    async fn build_image(
        &self,
        guard: &Guard<'_>,
        specification: &BuildSpecification,
        deliverable: &Deliverable,
    ) -> PipelineResult<ImageReport> {
        let docker = &self.config.docker;
        let builder = &self.collaborators.builder;
        let image = qualify_repository(&docker.output_registry, &specification.repository);

        guard
            .run(Stage::Pull, builder.pull(&specification.base_image))
            .await?
            .map_err(|source| PipelineError::Engine {
                operation: EngineOperation::Pull,
                image: specification.base_image.to_string(),
                source,
            })?;

        info!("Docker context {}", specification.build_folder.display());
        let dependencies = extract_dependency_metadata(&specification.build_folder);

        let image_id = guard
            .run(Stage::Build, builder.build(&specification.build_folder))
            .await?
            .map_err(|source| PipelineError::Engine {
                operation: EngineOperation::Build,
                image: image.clone(),
                source,
            })?;
        info!("Done building. Imageid: {}", image_id);

        let resolver = TagResolver::for_repository(docker, &specification.repository);
        let tags = guard
            .run(
                Stage::TagResolution,
                resolver.resolve_tags(
                    &specification.version,
                    &docker.push_extra_tags,
                    self.collaborators.provider.as_ref(),
                ),
            )
            .await?
            .map_err(|e| tag_error(Stage::TagResolution, e))?;

        for resolved in tags.iter() {
            info!("Tag: {}", resolved.tag);
            guard
                .run(Stage::Tag, builder.tag(&image_id, &resolved.tag))
                .await?
                .map_err(|source| PipelineError::Engine {
                    operation: EngineOperation::Tag,
                    image: resolved.tag.clone(),
                    source,
                })?;
        }

        if self.config.no_push {
            info!("Push disabled, leaving {} local", image);
            return Ok(ImageReport {
                repository: specification.repository.clone(),
                image,
                image_id,
                tags,
                pushed: false,
            });
        }

        guard
            .run(
                Stage::Push,
                builder.push(&image_id, &tags.tags(), self.credentials.as_ref()),
            )
            .await?
            .map_err(|source| PipelineError::Engine {
                operation: EngineOperation::Push,
                image: image.clone(),
                source,
            })?;
        info!("Pushed {} tag(s) for {}", tags.len(), image);

        self.trace_deployable_image(guard, specification, &tags, deliverable, dependencies)
            .await?;

        Ok(ImageReport {
            repository: specification.repository.clone(),
            image,
            image_id,
            tags,
            pushed: true,
        })
    }

    /// ベストエフォート。取得・送信の失敗や期限切れは警告のみで、
    /// キャンセルだけがこの段階を失敗させる
    async fn trace_deployable_image(
        &self,
        guard: &Guard<'_>,
        specification: &BuildSpecification,
        tags: &TagSet,
        deliverable: &Deliverable,
        dependencies: Vec<Dependency>,
    ) -> PipelineResult<()> {
        let provider = &self.collaborators.provider;
        let repository = &specification.repository;
        let Some(primary) = tags.primary() else {
            return Ok(());
        };

        let info = match guard
            .best_effort(provider.get_image_info(repository, &primary.name))
            .await?
        {
            Some(Ok(info)) => info,
            Some(Err(e)) => {
                warn!("Skipping trace for {}: {}", repository, e);
                return Ok(());
            }
            None => return Ok(()),
        };

        let image_config = match guard
            .best_effort(provider.get_image_config(repository, &info.digest))
            .await?
        {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                warn!("Skipping trace for {}: {}", repository, e);
                return Ok(());
            }
            None => return Ok(()),
        };

        let metadata = DeployableImageMetadata::new(
            repository.as_str(),
            tags,
            image_config,
            deliverable.sha1.as_str(),
            dependencies,
        );
        let payload = match serde_json::to_value(&metadata) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Unable to serialize image metadata: {}", e);
                return Ok(());
            }
        };

        tracing::debug!("Pushing trace data {}", payload);
        guard
            .best_effort(
                self.collaborators
                    .tracer
                    .add_image_metadata(DEPLOYABLE_IMAGE_TRACE, payload),
            )
            .await?;
        Ok(())
    }
}

fn tag_error(stage: Stage, error: TagError) -> PipelineError {
    match error {
        TagError::Collision { repository, tag } => PipelineError::Collision { repository, tag },
        TagError::Registry { repository, source } => PipelineError::RegistryQuery {
            stage,
            repository,
            source,
        },
    }
}
