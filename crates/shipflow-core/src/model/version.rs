//! Aurora バージョン
//!
//! アプリケーション・ビルダー・ベースイメージのバージョンを合成した識別子。
//! 完全バージョンはリリースタグと衝突検出キーの両方に使うため、
//! 同じ入力からは常に同じ文字列になります。

use super::artifact::{ArtifactCoordinates, Deliverable};
use super::image::DockerImage;
use crate::error::VersionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const MAX_TAG_LENGTH: usize = 128;

static SEMANTIC_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)([-+].+)?$").expect("semantic version pattern is valid")
});

/// 宣言バージョンの意味的分解 (`major.minor.patch[suffix]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// `-` または `+` から始まる残り部分
    pub suffix: Option<String>,
}

impl SemanticVersion {
    pub fn parse(version: &str) -> Option<Self> {
        let caps = SEMANTIC_VERSION.captures(version)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
            suffix: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }

    pub fn major_tag(&self) -> String {
        self.major.to_string()
    }

    pub fn minor_tag(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn patch_tag(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// 合成バージョン
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuroraVersion {
    app_version: String,
    snapshot: bool,
    declared_version: String,
    builder_version: String,
    base_image_version: String,
}

impl AuroraVersion {
    /// ビルダーとベースイメージから合成
    ///
    /// ベースイメージ成分は `{短縮名}-{タグ}` になります。
    pub fn from_builder_and_base(
        app_version: impl Into<String>,
        snapshot: bool,
        declared_version: impl Into<String>,
        builder_version: impl Into<String>,
        base_image: &DockerImage,
    ) -> Self {
        Self {
            app_version: app_version.into(),
            snapshot,
            declared_version: declared_version.into(),
            builder_version: builder_version.into(),
            base_image_version: format!("{}-{}", base_image.short_name(), base_image.tag),
        }
    }

    /// 完全バージョン `{app}-b{builder}-{base}`
    pub fn complete_version(&self) -> String {
        format!(
            "{}-b{}-{}",
            self.app_version, self.builder_version, self.base_image_version
        )
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    pub fn declared_version(&self) -> &str {
        &self.declared_version
    }

    pub fn builder_version(&self) -> &str {
        &self.builder_version
    }

    pub fn base_image_version(&self) -> &str {
        &self.base_image_version
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    /// 宣言バージョンの意味的分解。semver 形式でなければ None
    pub fn semantic(&self) -> Option<SemanticVersion> {
        SemanticVersion::parse(&self.declared_version)
    }

    /// 完全バージョンがイメージタグとして使えるか確認
    ///
    /// タグは `[A-Za-z0-9_][A-Za-z0-9_.-]*` で最大 128 文字。`1.2.3+5` のような
    /// ビルドメタデータ付きの宣言バージョンはここで弾かれます。
    pub fn ensure_valid_tag(&self) -> Result<(), VersionError> {
        let tag = self.complete_version();
        let invalid = |reason: String| VersionError::InvalidTag {
            version: tag.clone(),
            reason,
        };

        if tag.len() > MAX_TAG_LENGTH {
            return Err(invalid(format!(
                "{} characters, max {}",
                tag.len(),
                MAX_TAG_LENGTH
            )));
        }
        if tag.starts_with('.') || tag.starts_with('-') {
            return Err(invalid("must not start with '.' or '-'".to_string()));
        }
        if let Some(c) = tag
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid(format!("invalid character '{}'", c)));
        }
        Ok(())
    }
}

impl fmt::Display for AuroraVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.complete_version())
    }
}

/// アプリケーションバージョンを解決
///
/// スナップショットならリポジトリが解決したタイムスタンプ付きバージョン、
/// それ以外は宣言バージョンをそのまま返します。
pub fn resolve_snapshot_timestamp_version(
    coordinates: &ArtifactCoordinates,
    deliverable: &Deliverable,
) -> Result<String, VersionError> {
    if !coordinates.is_snapshot() {
        return Ok(coordinates.version.clone());
    }

    deliverable
        .resolved_version
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| VersionError::MissingSnapshotTimestamp(coordinates.to_string()))
}
