//! 実行設定の組み立て
//!
//! 環境変数・CLI 引数・シークレットファイルから [`RunConfig`] を1度だけ組み立てます。
//! 組み立て後の設定は不変で、パイプラインに所有権ごと渡されます。

pub mod error;

pub use error::*;

use shipflow_core::{
    ArtifactCoordinates, BaseImageSpec, DockerSpec, ExtraTags, Packaging, RepositoryAccess,
    RunConfig, TraceSpec, DEFAULT_BUILD_TIMEOUT_SECS,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// アーティファクトリポジトリ認証情報のデフォルトの置き場所
pub const DEFAULT_REPOSITORY_SECRET: &str = "/var/run/secrets/shipflow/repository.json";

/// レジストリ未指定時のフォールバック
pub const FALLBACK_REGISTRY: &str = "https://registry-1.docker.io";

/// 成果物の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationType {
    #[default]
    Java,
    NodeJs,
}

impl ApplicationType {
    pub fn default_classifier(&self) -> &'static str {
        match self {
            ApplicationType::Java => "leveransepakke",
            ApplicationType::NodeJs => "webleveransepakke",
        }
    }

    pub fn packaging(&self) -> Packaging {
        match self {
            ApplicationType::Java => Packaging::Zip,
            ApplicationType::NodeJs => Packaging::Tgz,
        }
    }
}

impl FromStr for ApplicationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "java" => Ok(ApplicationType::Java),
            "nodejs" | "node" => Ok(ApplicationType::NodeJs),
            other => Err(ConfigError::Invalid {
                name: "APPLICATION_TYPE",
                message: format!("unknown application type '{}'", other),
            }),
        }
    }
}

/// 設定の入力値
///
/// CLI (clap の `env` 属性) から渡される未検証の値です。
#[derive(Debug, Clone, Default)]
pub struct ConfigInput {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub application_type: ApplicationType,
    pub base_image: Option<String>,
    pub base_version: Option<String>,
    pub output_registry: Option<String>,
    pub output_repository: Option<String>,
    pub internal_pull_registry: Option<String>,
    pub push_extra_tags: Option<String>,
    pub tag_with: Option<String>,
    pub tag_with_extra_tags: bool,
    pub tag_overwrite: bool,
    pub builder_version: Option<String>,
    pub no_push: bool,
    pub build_timeout_secs: Option<u64>,
    pub trace_url: Option<String>,
    pub trace_context: Option<String>,
    pub repository_url: Option<String>,
    pub repository_secret: Option<PathBuf>,
}

impl ConfigInput {
    /// 検証して [`RunConfig`] を組み立てる
    pub fn resolve(self) -> Result<RunConfig> {
        let group_id = required(self.group_id, "GROUP_ID")?;
        let artifact_id = required(self.artifact_id, "ARTIFACT_ID")?;
        let version = required(self.version, "VERSION")?;
        let base_repository = required(self.base_image, "DOCKER_BASE_IMAGE")?;
        let base_version = required(self.base_version, "DOCKER_BASE_VERSION")?;

        let classifier = non_empty(self.classifier)
            .unwrap_or_else(|| self.application_type.default_classifier().to_string());

        let push_extra_tags = match non_empty(self.push_extra_tags) {
            Some(list) => list.parse::<ExtraTags>()?,
            None => ExtraTags::default(),
        };

        let build_timeout = match self.build_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "BUILD_TIMEOUT",
                    message: "timeout must be greater than zero".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
        };

        let output_repository = non_empty(self.output_repository)
            .unwrap_or_else(|| format!("{}/{}", group_id, artifact_id));

        let internal_pull_registry = match non_empty(self.internal_pull_registry) {
            Some(registry) => normalize_registry_url(&registry),
            None => {
                tracing::warn!(
                    "No internal pull registry specified. Using {}",
                    FALLBACK_REGISTRY
                );
                FALLBACK_REGISTRY.to_string()
            }
        };

        let secret_path = self
            .repository_secret
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPOSITORY_SECRET));
        let mut repository_access = load_repository_access(&secret_path)?;
        if let Some(url) = non_empty(self.repository_url) {
            repository_access.url = url;
        }

        Ok(RunConfig {
            application: ArtifactCoordinates {
                group_id,
                artifact_id,
                version,
                classifier: Some(classifier),
                packaging: self.application_type.packaging(),
            },
            base_image: BaseImageSpec {
                repository: base_repository,
                version: base_version,
            },
            docker: DockerSpec {
                output_registry: non_empty(self.output_registry).unwrap_or_default(),
                output_repository,
                internal_pull_registry,
                push_extra_tags,
                tag_with: non_empty(self.tag_with),
                tag_with_extra_tags: self.tag_with_extra_tags,
                tag_overwrite: self.tag_overwrite,
            },
            builder_version: non_empty(self.builder_version)
                .unwrap_or_else(|| "local".to_string()),
            repository_access,
            no_push: self.no_push,
            build_timeout,
            trace: TraceSpec {
                url: non_empty(self.trace_url).unwrap_or_default(),
                context: non_empty(self.trace_context).unwrap_or_default(),
            },
        })
    }
}

/// シークレットファイルからリポジトリのアクセス情報を読み込む
///
/// ファイルがなければ警告して空の情報を返します。
/// 存在するのに JSON として不正な場合はエラーです。
pub fn load_repository_access(path: &Path) -> Result<RepositoryAccess> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                "Could not read repository access at {}, continuing without credentials",
                path.display()
            );
            return Ok(RepositoryAccess::default());
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    serde_json::from_str(&content).map_err(|source| ConfigError::SecretFile {
        path: path.to_path_buf(),
        source,
    })
}

/// スキームがなければ `https://` を付ける
pub fn normalize_registry_url(registry: &str) -> String {
    if registry.starts_with("https://") || registry.starts_with("http://") {
        registry.to_string()
    } else {
        format!("https://{}", registry)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    non_empty(value).ok_or(ConfigError::Missing(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn input(secret_dir: &Path) -> ConfigInput {
        ConfigInput {
            group_id: Some("org.example".to_string()),
            artifact_id: Some("demo".to_string()),
            version: Some("1.2.3".to_string()),
            base_image: Some("aurora/wingnut11".to_string()),
            base_version: Some("1".to_string()),
            repository_secret: Some(secret_dir.join("repository.json")),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = input(temp_dir.path()).resolve().unwrap();

        assert_eq!(config.application.classifier.as_deref(), Some("leveransepakke"));
        assert_eq!(config.application.packaging, Packaging::Zip);
        assert_eq!(config.docker.output_repository, "org.example/demo");
        assert_eq!(config.docker.internal_pull_registry, FALLBACK_REGISTRY);
        assert_eq!(config.docker.push_extra_tags, ExtraTags::default());
        assert_eq!(config.builder_version, "local");
        assert_eq!(config.build_timeout, Duration::from_secs(900));
        assert!(config.docker.tag_with.is_none());
        assert!(!config.trace.is_enabled());
    }

    #[test]
    fn test_resolve_nodejs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut input = input(temp_dir.path());
        input.application_type = "NodeJs".parse().unwrap();
        input.internal_pull_registry = Some("registry:5000".to_string());
        input.push_extra_tags = Some("major".to_string());

        let config = input.resolve().unwrap();
        assert_eq!(config.application.packaging, Packaging::Tgz);
        assert_eq!(config.application.classifier.as_deref(), Some("webleveransepakke"));
        assert_eq!(config.docker.internal_pull_registry, "https://registry:5000");
        assert!(config.docker.push_extra_tags.major);
        assert!(!config.docker.push_extra_tags.latest);
    }

    #[test]
    fn test_resolve_missing_version() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut input = input(temp_dir.path());
        input.version = Some("  ".to_string());

        assert!(matches!(input.resolve(), Err(ConfigError::Missing("VERSION"))));
    }

    #[test]
    fn test_resolve_rejects_zero_timeout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut input = input(temp_dir.path());
        input.build_timeout_secs = Some(0);

        assert!(matches!(
            input.resolve(),
            Err(ConfigError::Invalid { name: "BUILD_TIMEOUT", .. })
        ));
    }

    #[test]
    fn test_resolve_unknown_extra_tag() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut input = input(temp_dir.path());
        input.push_extra_tags = Some("latest,weekly".to_string());

        assert!(matches!(input.resolve(), Err(ConfigError::ExtraTags(_))));
    }

    #[test]
    fn test_load_repository_access() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("repository.json");
        fs::write(
            &path,
            r#"{"nexusUrl":"https://nexus.example.com","username":"ci","password":"pw"}"#,
        )
        .unwrap();

        let access = load_repository_access(&path).unwrap();
        assert_eq!(access.url, "https://nexus.example.com");
        assert_eq!(access.username, "ci");
    }

    #[test]
    fn test_load_repository_access_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let access = load_repository_access(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(access, RepositoryAccess::default());
    }

    #[test]
    fn test_load_repository_access_malformed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("repository.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            load_repository_access(&path),
            Err(ConfigError::SecretFile { .. })
        ));
    }

    #[test]
    fn test_repository_url_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut input = input(temp_dir.path());
        input.repository_url = Some("https://maven.example.com/repository/releases".to_string());

        let config = input.resolve().unwrap();
        assert_eq!(
            config.repository_access.url,
            "https://maven.example.com/repository/releases"
        );
    }

    #[test]
    fn test_normalize_registry_url() {
        assert_eq!(normalize_registry_url("registry:5000"), "https://registry:5000");
        assert_eq!(normalize_registry_url("http://localhost:5000"), "http://localhost:5000");
    }
}
