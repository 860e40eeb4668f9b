use shipflow_core::{DownloadError, EngineError, PrepareError, RegistryError, VersionError};
use std::fmt;
use thiserror::Error;

/// パイプラインの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    BaseImageLookup,
    VersionDerivation,
    Preparation,
    CollisionCheck,
    Pull,
    Build,
    TagResolution,
    Tag,
    Push,
    Trace,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::BaseImageLookup => "base image lookup",
            Stage::VersionDerivation => "version derivation",
            Stage::Preparation => "preparation",
            Stage::CollisionCheck => "collision check",
            Stage::Pull => "pull",
            Stage::Build => "build",
            Stage::TagResolution => "tag resolution",
            Stage::Tag => "tag",
            Stage::Push => "push",
            Stage::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// コンテナエンジンの操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOperation {
    Pull,
    Build,
    Tag,
    Push,
}

impl fmt::Display for EngineOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineOperation::Pull => "pull",
            EngineOperation::Build => "build",
            EngineOperation::Tag => "tag",
            EngineOperation::Push => "push",
        };
        f.write_str(name)
    }
}

/// 実行を終了させるエラー
///
/// 最初に発生したものだけが呼び出し元に返ります。自動リトライは行いません。
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not download deliverable {artifact}: {source}")]
    Download {
        artifact: String,
        #[source]
        source: DownloadError,
    },

    #[error("Unable to derive version for {artifact}: {source}")]
    VersionResolution {
        artifact: String,
        #[source]
        source: VersionError,
    },

    #[error("Error preparing image for version {version}: {source}")]
    Preparation {
        version: String,
        #[source]
        source: PrepareError,
    },

    #[error("There is already a build with tag {tag} in {repository}, consider TAG_OVERWRITE")]
    Collision { repository: String, tag: String },

    #[error("There was an error with the {operation} operation on {image}: {source}")]
    Engine {
        operation: EngineOperation,
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("Registry query for {repository} failed during {stage}: {source}")]
    RegistryQuery {
        stage: Stage,
        repository: String,
        #[source]
        source: RegistryError,
    },

    #[error("Build cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("Build timed out during {stage}")]
    TimedOut { stage: Stage },
}

impl PipelineError {
    /// 失敗した段階
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Download { .. } => Stage::Download,
            PipelineError::VersionResolution { .. } => Stage::VersionDerivation,
            PipelineError::Preparation { .. } => Stage::Preparation,
            PipelineError::Collision { .. } => Stage::CollisionCheck,
            PipelineError::Engine { operation, .. } => match operation {
                EngineOperation::Pull => Stage::Pull,
                EngineOperation::Build => Stage::Build,
                EngineOperation::Tag => Stage::Tag,
                EngineOperation::Push => Stage::Push,
            },
            PipelineError::RegistryQuery { stage, .. }
            | PipelineError::Cancelled { stage }
            | PipelineError::TimedOut { stage } => *stage,
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Collision { repository, tag } => format!(
                "タグ {} は {} に既に存在します\n\
                 \n\
                 解決方法:\n\
                 1. バージョンを上げて再ビルドしてください\n\
                 2. 上書きが意図的な場合は TAG_OVERWRITE=true を指定してください",
                tag, repository
            ),
            PipelineError::Cancelled { stage } => {
                format!("{} の途中でビルドが中断されました", stage)
            }
            PipelineError::TimedOut { stage } => format!(
                "{} の途中でタイムアウトしました\n\
                 \n\
                 BUILD_TIMEOUT で制限時間を延長できます。",
                stage
            ),
            _ => format!("{} に失敗しました: {}", self.stage(), self),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
