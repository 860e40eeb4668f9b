//! 実行設定
//!
//! プロセス開始時に一度だけ組み立て、所有権ごとオーケストレータへ渡す不変の値です。

use super::artifact::ArtifactCoordinates;
use crate::error::UnknownExtraTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// ビルド全体のデフォルトタイムアウト (秒)
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 900;

/// 完全バージョンタグに重ねる追加タグの方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraTags {
    pub latest: bool,
    pub major: bool,
    pub minor: bool,
    pub patch: bool,
}

impl ExtraTags {
    pub fn none() -> Self {
        Self {
            latest: false,
            major: false,
            minor: false,
            patch: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.latest || self.major || self.minor || self.patch)
    }
}

impl Default for ExtraTags {
    fn default() -> Self {
        Self {
            latest: true,
            major: true,
            minor: true,
            patch: true,
        }
    }
}

impl FromStr for ExtraTags {
    type Err = UnknownExtraTag;

    /// `latest,major,minor,patch` 形式の一覧を解析
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tags = ExtraTags::none();
        for word in s.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            match word.to_ascii_lowercase().as_str() {
                "latest" => tags.latest = true,
                "major" => tags.major = true,
                "minor" => tags.minor = true,
                "patch" => tags.patch = true,
                _ => return Err(UnknownExtraTag(word.to_string())),
            }
        }
        Ok(tags)
    }
}

impl fmt::Display for ExtraTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<&str> = [
            (self.latest, "latest"),
            (self.major, "major"),
            (self.minor, "minor"),
            (self.patch, "patch"),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, word)| *word)
        .collect();
        f.write_str(&words.join(","))
    }
}

/// ベースイメージの指定
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BaseImageSpec {
    pub repository: String,
    /// レジストリに問い合わせる参照 (タグ)
    pub version: String,
}

/// 出力イメージとタグ付けの設定
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DockerSpec {
    pub output_registry: String,
    pub output_repository: String,
    /// ベースイメージを pull するレジストリ
    pub internal_pull_registry: String,
    pub push_extra_tags: ExtraTags,
    /// 固定タグ。設定されるとバージョン由来のタグ付けを置き換える
    ///
    /// 完全バージョンの衝突確認は `tag_overwrite` がない限り行われる
    pub tag_with: Option<String>,
    /// 固定タグに追加タグも併せて付与する
    pub tag_with_extra_tags: bool,
    /// 既存の完全バージョンタグの上書きを許可
    pub tag_overwrite: bool,
}

/// アーティファクトリポジトリへのアクセス情報
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryAccess {
    #[serde(rename = "nexusUrl", default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for RepositoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryAccess")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 来歴 (トレース) 送信先
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceSpec {
    pub url: String,
    pub context: String,
}

impl TraceSpec {
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty() && !self.context.is_empty()
    }
}

/// 1回のビルド実行の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub application: ArtifactCoordinates,
    pub base_image: BaseImageSpec,
    pub docker: DockerSpec,
    /// ビルダー自身のバージョン (ローカル実行では `local`)
    pub builder_version: String,
    pub repository_access: RepositoryAccess,
    /// タグ付けまで行い、プッシュと来歴送信を抑止
    pub no_push: bool,
    pub build_timeout: Duration,
    pub trace: TraceSpec,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            application: ArtifactCoordinates::default(),
            base_image: BaseImageSpec::default(),
            docker: DockerSpec::default(),
            builder_version: "local".to_string(),
            repository_access: RepositoryAccess::default(),
            no_push: false,
            build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
            trace: TraceSpec::default(),
        }
    }
}
