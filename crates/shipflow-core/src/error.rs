//! Collaborator and domain error types

use thiserror::Error;

/// アーティファクトリポジトリからのダウンロード失敗
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Repository rejected credentials for {url} (HTTP {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Unable to resolve snapshot version for {0}")]
    SnapshotMetadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// ビルドコンテキスト準備の失敗
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Template error: {0}")]
    Template(String),

    #[error("Unsupported deliverable: {0}")]
    UnsupportedDeliverable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// コンテナエンジン操作の失敗
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Docker connection error: {0}")]
    Connection(String),

    #[error("Pull failed for {image}: {message}")]
    PullFailed { image: String, message: String },

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Tagging {image_id} as {tag} failed: {message}")]
    TagFailed {
        image_id: String,
        tag: String,
        message: String,
    },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// レジストリのメタデータ取得失敗
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Manifest not found: {repository}:{reference}")]
    ManifestNotFound {
        repository: String,
        reference: String,
    },

    #[error("Registry request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Unexpected registry response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

/// バージョン導出の失敗
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("Snapshot artifact {0} has no resolved timestamp version")]
    MissingSnapshotTimestamp(String),

    #[error("Version {version} cannot be used as an image tag: {reason}")]
    InvalidTag { version: String, reason: String },
}

/// タグ解決・衝突検出の失敗
#[derive(Error, Debug)]
pub enum TagError {
    #[error("There is already a build with tag {tag} in {repository}, consider TAG_OVERWRITE")]
    Collision { repository: String, tag: String },

    #[error("Unable to list tags for {repository}: {source}")]
    Registry {
        repository: String,
        #[source]
        source: RegistryError,
    },
}

/// 追加タグ方針に未知の種別が含まれる
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown extra tag kind '{0}' (expected latest, major, minor or patch)")]
pub struct UnknownExtraTag(pub String);
