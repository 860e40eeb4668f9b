use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("必須の設定がありません: {0}")]
    Missing(&'static str),

    #[error("不正な設定値 {name}: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("追加タグの指定が不正です: {0}")]
    ExtraTags(#[from] shipflow_core::UnknownExtraTag),

    #[error("{path} を解析できません。指定する場合は正しい JSON である必要があります: {source}")]
    SecretFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
