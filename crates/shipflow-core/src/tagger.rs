//! タグ解決
//!
//! Aurora バージョンと追加タグ方針から、付与・プッシュする完全修飾タグ列を決定します。
//! 戦略は実行ごとに設定から1度だけ選びます。
//!
//! - [`NormalTagResolver`]: 完全バージョン + 追加タグ。上書き保護あり
//! - [`SingleTagResolver`]: 固定タグのみ。タグ解決時にはレジストリを問い合わせない

use crate::collision::ensure_not_published;
use crate::error::TagError;
use crate::model::{AuroraVersion, DockerSpec, ExtraTags, qualify_tag};
use crate::provider::ImageInfoProvider;
use serde::Serialize;

/// 解決済みタグ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTag {
    /// 修飾前のタグ名 (来歴の対応付けに使う)
    pub name: String,
    /// `registry/repository:name`
    pub tag: String,
}

/// 順序付きのタグ集合
///
/// 同じ完全修飾タグは1度しか含まれません。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TagSet {
    tags: Vec<ResolvedTag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加。既に同じ完全修飾タグがあれば無視して false を返す
    pub fn push(&mut self, name: impl Into<String>, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.tags.iter().any(|t| t.tag == tag) {
            return false;
        }
        self.tags.push(ResolvedTag {
            name: name.into(),
            tag,
        });
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedTag> {
        self.tags.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.tag.clone()).collect()
    }

    /// 先頭 (完全バージョンまたは固定タグ)
    pub fn primary(&self) -> Option<&ResolvedTag> {
        self.tags.first()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    fn qualified(registry: &str, repository: &str, names: Vec<String>) -> Self {
        let mut set = Self::new();
        for name in names {
            let tag = qualify_tag(registry, repository, &name);
            if !set.push(name, tag) {
                tracing::debug!("Suppressed duplicate tag for {}", repository);
            }
        }
        set
    }
}

/// バージョンから導出する追加タグ名
///
/// スナップショットと semver 形式でないバージョンには付与しません。
/// `patch` は宣言バージョンにサフィックスがある場合のみ付与します。
/// サフィックスのない `x.y.z` は完全バージョンタグが既にそのリリースを指すためです。
fn extra_tag_names(version: &AuroraVersion, extra: &ExtraTags) -> Vec<String> {
    if version.is_snapshot() {
        return Vec::new();
    }
    let Some(semantic) = version.semantic() else {
        tracing::debug!(
            "Declared version {} is not semantic, skipping extra tags",
            version.declared_version()
        );
        return Vec::new();
    };

    let mut names = Vec::new();
    if extra.latest {
        names.push("latest".to_string());
    }
    if extra.major {
        names.push(semantic.major_tag());
    }
    if extra.minor {
        names.push(semantic.minor_tag());
    }
    if extra.patch && semantic.suffix.is_some() {
        names.push(semantic.patch_tag());
    }
    names
}

/// デフォルトの戦略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalTagResolver {
    pub registry: String,
    pub repository: String,
    pub overwrite: bool,
}

impl NormalTagResolver {
    pub fn candidate_tags(&self, version: &AuroraVersion, extra: &ExtraTags) -> Vec<String> {
        let mut names = vec![version.complete_version()];
        names.extend(extra_tag_names(version, extra));
        names
    }

    pub async fn resolve_tags(
        &self,
        version: &AuroraVersion,
        extra: &ExtraTags,
        provider: &dyn ImageInfoProvider,
    ) -> Result<TagSet, TagError> {
        if !self.overwrite {
            ensure_not_published(provider, &self.repository, version).await?;
        }
        Ok(TagSet::qualified(
            &self.registry,
            &self.repository,
            self.candidate_tags(version, extra),
        ))
    }
}

/// 固定タグ戦略
///
/// 固定タグ自体の上書き保護は行いません。同じタグへの再プッシュは常に既存イメージを
/// 置き換えます。完全バージョンの衝突確認はパイプラインが事前に行います。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleTagResolver {
    pub tag: String,
    pub registry: String,
    pub repository: String,
    /// 追加タグ方針も併用する
    pub with_extra_tags: bool,
}

impl SingleTagResolver {
    pub fn candidate_tags(&self, version: &AuroraVersion, extra: &ExtraTags) -> Vec<String> {
        let mut names = vec![self.tag.clone()];
        if self.with_extra_tags {
            names.extend(extra_tag_names(version, extra));
        }
        names
    }

    pub fn resolve_tags(&self, version: &AuroraVersion, extra: &ExtraTags) -> TagSet {
        TagSet::qualified(
            &self.registry,
            &self.repository,
            self.candidate_tags(version, extra),
        )
    }
}

/// 実行ごとに選ばれるタグ解決戦略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagResolver {
    Normal(NormalTagResolver),
    SingleTag(SingleTagResolver),
}

impl TagResolver {
    /// 設定から戦略を選択 (`tag_with` があれば固定タグ)
    pub fn for_repository(docker: &DockerSpec, repository: &str) -> Self {
        match docker.tag_with.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => TagResolver::SingleTag(SingleTagResolver {
                tag: tag.to_string(),
                registry: docker.output_registry.clone(),
                repository: repository.to_string(),
                with_extra_tags: docker.tag_with_extra_tags,
            }),
            None => TagResolver::Normal(NormalTagResolver {
                registry: docker.output_registry.clone(),
                repository: repository.to_string(),
                overwrite: docker.tag_overwrite,
            }),
        }
    }

    /// 修飾前のタグ名一覧 (I/O なし)
    pub fn candidate_tags(&self, version: &AuroraVersion, extra: &ExtraTags) -> Vec<String> {
        match self {
            TagResolver::Normal(r) => r.candidate_tags(version, extra),
            TagResolver::SingleTag(r) => r.candidate_tags(version, extra),
        }
    }

    pub async fn resolve_tags(
        &self,
        version: &AuroraVersion,
        extra: &ExtraTags,
        provider: &dyn ImageInfoProvider,
    ) -> Result<TagSet, TagError> {
        match self {
            TagResolver::Normal(r) => r.resolve_tags(version, extra, provider).await,
            TagResolver::SingleTag(r) => Ok(r.resolve_tags(version, extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::model::{DockerImage, ExistingTags, ImageInfo};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// get_tags の呼び出しを記録するレジストリ
    #[derive(Default)]
    struct RecordingRegistry {
        tags: Vec<String>,
        queries: Mutex<Vec<String>>,
    }

    impl RecordingRegistry {
        fn with_tags(tags: &[&str]) -> Self {
            Self {
                tags: tags.iter().map(|t| t.to_string()).collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ImageInfoProvider for RecordingRegistry {
        async fn get_image_info(
            &self,
            _repository: &str,
            _reference: &str,
        ) -> Result<ImageInfo, RegistryError> {
            Ok(ImageInfo::default())
        }

        async fn get_image_config(
            &self,
            _repository: &str,
            _digest: &str,
        ) -> Result<serde_json::Value, RegistryError> {
            Ok(serde_json::Value::Null)
        }

        async fn get_tags(&self, repository: &str) -> Result<ExistingTags, RegistryError> {
            self.queries.lock().unwrap().push(repository.to_string());
            Ok(ExistingTags {
                name: repository.to_string(),
                tags: self.tags.clone(),
            })
        }
    }

    fn release(declared: &str) -> AuroraVersion {
        let base = DockerImage::new("", "aurora/wingnut11", "1.3.7");
        AuroraVersion::from_builder_and_base(declared, false, declared, "1.5.0", &base)
    }

    fn snapshot() -> AuroraVersion {
        let base = DockerImage::new("", "aurora/wingnut11", "1.3.7");
        AuroraVersion::from_builder_and_base(
            "1.2.3-20240105.101010-7",
            true,
            "1.2.3-SNAPSHOT",
            "1.5.0",
            &base,
        )
    }

    fn normal(overwrite: bool) -> NormalTagResolver {
        NormalTagResolver {
            registry: "registry:5000".to_string(),
            repository: "org/app".to_string(),
            overwrite,
        }
    }

    #[tokio::test]
    async fn test_release_with_all_extra_tags() {
        let registry = RecordingRegistry::default();
        let version = release("1.2.3");

        let tags = normal(false)
            .resolve_tags(&version, &ExtraTags::default(), &registry)
            .await
            .unwrap();

        assert_eq!(
            tags.tags(),
            vec![
                "registry:5000/org/app:1.2.3-b1.5.0-wingnut11-1.3.7".to_string(),
                "registry:5000/org/app:latest".to_string(),
                "registry:5000/org/app:1".to_string(),
                "registry:5000/org/app:1.2".to_string(),
            ]
        );
        assert_eq!(
            tags.names(),
            vec!["1.2.3-b1.5.0-wingnut11-1.3.7", "latest", "1", "1.2"]
        );
        assert_eq!(registry.query_count(), 1);
    }

    #[tokio::test]
    async fn test_patch_tag_for_suffixed_version() {
        let registry = RecordingRegistry::default();
        let version = release("1.2.3-rc1");

        let tags = normal(true)
            .resolve_tags(&version, &ExtraTags::default(), &registry)
            .await
            .unwrap();

        assert_eq!(
            tags.names(),
            vec!["1.2.3-rc1-b1.5.0-wingnut11-1.3.7", "latest", "1", "1.2", "1.2.3"]
        );
    }

    #[tokio::test]
    async fn test_snapshot_only_complete_version() {
        let registry = RecordingRegistry::default();

        let tags = normal(false)
            .resolve_tags(&snapshot(), &ExtraTags::default(), &registry)
            .await
            .unwrap();

        assert_eq!(tags.len(), 1);
        assert_eq!(
            tags.primary().unwrap().name,
            "1.2.3-20240105.101010-7-b1.5.0-wingnut11-1.3.7"
        );
        // スナップショットは衝突検出の対象外
        assert_eq!(registry.query_count(), 0);
    }

    #[tokio::test]
    async fn test_non_semantic_version_has_no_extra_tags() {
        let registry = RecordingRegistry::default();
        let version = release("feature-login");

        let tags = normal(false)
            .resolve_tags(&version, &ExtraTags::default(), &registry)
            .await
            .unwrap();

        assert_eq!(tags.names(), vec!["feature-login-b1.5.0-wingnut11-1.3.7"]);
    }

    #[tokio::test]
    async fn test_collision_detected() {
        let registry = RecordingRegistry::with_tags(&["latest", "1.2.3-b1.5.0-wingnut11-1.3.7"]);

        let result = normal(false)
            .resolve_tags(&release("1.2.3"), &ExtraTags::default(), &registry)
            .await;

        match result {
            Err(TagError::Collision { repository, tag }) => {
                assert_eq!(repository, "org/app");
                assert_eq!(tag, "1.2.3-b1.5.0-wingnut11-1.3.7");
            }
            other => panic!("Expected collision, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overwrite_skips_collision_check() {
        let registry = RecordingRegistry::with_tags(&["1.2.3-b1.5.0-wingnut11-1.3.7"]);

        let tags = normal(true)
            .resolve_tags(&release("1.2.3"), &ExtraTags::none(), &registry)
            .await
            .unwrap();

        assert_eq!(tags.len(), 1);
        assert_eq!(registry.query_count(), 0);
    }

    #[tokio::test]
    async fn test_single_tag_ignores_version() {
        let registry = RecordingRegistry::with_tags(&["release-candidate"]);
        let docker = DockerSpec {
            output_registry: "registry:5000".to_string(),
            tag_with: Some("release-candidate".to_string()),
            ..Default::default()
        };
        let resolver = TagResolver::for_repository(&docker, "org/app");

        for version in [release("1.2.3"), release("9.9.9"), snapshot()] {
            let tags = resolver
                .resolve_tags(&version, &ExtraTags::default(), &registry)
                .await
                .unwrap();
            assert_eq!(tags.tags(), vec!["registry:5000/org/app:release-candidate"]);
        }
        assert_eq!(registry.query_count(), 0);
    }

    #[test]
    fn test_single_tag_with_extra_tags() {
        let resolver = SingleTagResolver {
            tag: "release-candidate".to_string(),
            registry: String::new(),
            repository: "org/app".to_string(),
            with_extra_tags: true,
        };

        let tags = resolver.resolve_tags(&release("2.4.1"), &ExtraTags::default());
        assert_eq!(
            tags.tags(),
            vec![
                "org/app:release-candidate",
                "org/app:latest",
                "org/app:2",
                "org/app:2.4",
            ]
        );
    }

    #[test]
    fn test_duplicate_tags_suppressed() {
        // 固定タグと追加タグが同じ文字列になるケース
        let resolver = SingleTagResolver {
            tag: "latest".to_string(),
            registry: String::new(),
            repository: "org/app".to_string(),
            with_extra_tags: true,
        };

        let tags = resolver.resolve_tags(&release("3.0.0"), &ExtraTags::default());
        assert_eq!(tags.names(), vec!["latest", "3", "3.0"]);
    }

    #[test]
    fn test_for_repository_selects_normal() {
        let docker = DockerSpec {
            tag_overwrite: true,
            tag_with: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            TagResolver::for_repository(&docker, "org/app"),
            TagResolver::Normal(NormalTagResolver { overwrite: true, .. })
        ));
    }

    #[test]
    fn test_candidate_tags_are_deterministic() {
        let resolver = TagResolver::Normal(normal(true));
        let version = release("1.2.3");
        assert_eq!(
            resolver.candidate_tags(&version, &ExtraTags::default()),
            resolver.candidate_tags(&version, &ExtraTags::default())
        );
    }
}
