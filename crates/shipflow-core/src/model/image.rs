//! イメージ参照とレジストリメタデータ

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// レジストリ上のイメージ参照
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DockerImage {
    /// レジストリ (`host[:port]`、スキームなし)。空ならエンジンのデフォルト
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl DockerImage {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// リポジトリの最後のパス要素 (`aurora/wingnut11` -> `wingnut11`)
    pub fn short_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(self.repository.as_str())
    }

    /// タグを除いたイメージ名 (`registry/repository`)
    pub fn name(&self) -> String {
        qualify_repository(&self.registry, &self.repository)
    }
}

impl fmt::Display for DockerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.tag)
    }
}

/// `registry/repository` を組み立てる。レジストリが空ならリポジトリのみ
pub fn qualify_repository(registry: &str, repository: &str) -> String {
    let registry = strip_scheme(registry).trim_end_matches('/');
    if registry.is_empty() {
        repository.to_string()
    } else {
        format!("{}/{}", registry, repository)
    }
}

/// 完全修飾タグ `registry/repository:tag`
pub fn qualify_tag(registry: &str, repository: &str, tag: &str) -> String {
    format!("{}:{}", qualify_repository(registry, repository), tag)
}

/// URL からスキームを除去 (`https://registry:5000` -> `registry:5000`)
pub fn strip_scheme(registry: &str) -> &str {
    registry
        .strip_prefix("https://")
        .or_else(|| registry.strip_prefix("http://"))
        .unwrap_or(registry)
}

/// イメージ名とタグを分離
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // ポート番号は / を含まない純粋な数字
        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}

/// ベースイメージのメタデータ
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// マニフェストのダイジェスト (`sha256:...`)
    pub digest: String,
    /// ビルド時に固定されたベースイメージの完全バージョン
    pub complete_base_image_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// 解決済みのベースイメージ
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BaseImage {
    pub image: DockerImage,
    pub info: ImageInfo,
}

/// レジストリの既存タグ一覧
///
/// 衝突検出のたびに取得し直します。キャッシュしません。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExistingTags {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExistingTags {
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// レジストリへのプッシュ用認証情報
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub server_address: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("server_address", &self.server_address)
            .finish()
    }
}
