//! 来歴メタデータ
//!
//! プッシュ後にトレーサへ送るペイロードと、ビルドコンテキストに含まれる
//! 依存ライブラリの一覧を組み立てます。

use serde::Serialize;
use sha1::{Digest, Sha1};
use shipflow_core::TagSet;
use std::collections::BTreeMap;
use std::path::Path;

/// ビルドコンテキスト内で依存ライブラリを探すディレクトリ
pub const DEPENDENCY_DIR: &str = "app/lib";

/// イメージに同梱された依存ファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,
    pub size: u64,
    pub sha1: String,
}

/// `deployableImage` 種別のペイロード
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployableImageMetadata {
    pub image_name: String,
    /// タグ名 -> 完全修飾タグ
    pub tags: BTreeMap<String, String>,
    pub image_info: serde_json::Value,
    pub nexus_sha1: String,
    pub dependencies: Vec<Dependency>,
}

impl DeployableImageMetadata {
    pub fn new(
        image_name: impl Into<String>,
        tags: &TagSet,
        image_info: serde_json::Value,
        nexus_sha1: impl Into<String>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            tags: tags
                .iter()
                .map(|t| (t.name.clone(), t.tag.clone()))
                .collect(),
            image_info,
            nexus_sha1: nexus_sha1.into(),
            dependencies,
        }
    }
}

/// ビルドコンテキストの依存ファイルを列挙
///
/// 読めないファイルは来歴から除外するだけで、ビルドは止めません。
pub fn extract_dependency_metadata(build_folder: &Path) -> Vec<Dependency> {
    let lib_dir = build_folder.join(DEPENDENCY_DIR);
    let entries = match std::fs::read_dir(&lib_dir) {
        Ok(entries) => entries,
        Err(_) => {
            tracing::debug!("No dependency directory at {}", lib_dir.display());
            return Vec::new();
        }
    };

    let mut dependencies: Vec<Dependency> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let path = entry.path();
            match std::fs::read(&path) {
                Ok(content) => Some(Dependency {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: content.len() as u64,
                    sha1: hex::encode(Sha1::digest(&content)),
                }),
                Err(e) => {
                    tracing::warn!("Skipping dependency {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();

    dependencies.sort_by(|a, b| a.name.cmp(&b.name));
    dependencies
}
