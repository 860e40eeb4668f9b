//! アーティファクト座標とダウンロード済み成果物

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// スナップショット版を示すマーカー
pub const SNAPSHOT_MARKER: &str = "SNAPSHOT";

/// 成果物のパッケージ形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    #[default]
    Zip,
    Tgz,
}

impl Packaging {
    pub fn extension(&self) -> &'static str {
        match self {
            Packaging::Zip => "zip",
            Packaging::Tgz => "tgz",
        }
    }
}

/// アーティファクトリポジトリ上の成果物を特定する座標 (GAV)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default)]
    pub classifier: Option<String>,
    #[serde(default)]
    pub packaging: Packaging,
}

impl ArtifactCoordinates {
    /// 宣言されたバージョンがスナップショットかどうか
    pub fn is_snapshot(&self) -> bool {
        self.version.contains(SNAPSHOT_MARKER)
    }

    /// 指定バージョンでのファイル名
    ///
    /// `{artifact}-{version}[-{classifier}].{ext}`
    pub fn file_name(&self, version: &str) -> String {
        match self.classifier.as_deref().filter(|c| !c.is_empty()) {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.artifact_id,
                version,
                classifier,
                self.packaging.extension()
            ),
            None => format!(
                "{}-{}.{}",
                self.artifact_id,
                version,
                self.packaging.extension()
            ),
        }
    }

    /// Maven レイアウトでのディレクトリパス (`group/as/path/artifact/version`)
    pub fn directory_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version
        )
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(classifier) = self.classifier.as_deref().filter(|c| !c.is_empty()) {
            write!(f, ":{}", classifier)?;
        }
        write!(f, "@{}", self.packaging.extension())
    }
}

/// ダウンロード済みの成果物
///
/// 1回の実行の間だけオーケストレータが所有します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliverable {
    /// ローカルに保存されたファイル
    pub path: PathBuf,
    /// 内容の SHA-1 (小文字16進)
    pub sha1: String,
    /// スナップショットの場合、リポジトリが解決したタイムスタンプ付きバージョン
    pub resolved_version: Option<String>,
}

impl Deliverable {
    pub fn new(path: impl Into<PathBuf>, sha1: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sha1: sha1.into(),
            resolved_version: None,
        }
    }

    pub fn with_resolved_version(mut self, version: impl Into<String>) -> Self {
        self.resolved_version = Some(version.into());
        self
    }
}
