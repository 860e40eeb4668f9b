//! ビルド仕様

use super::image::DockerImage;
use super::version::AuroraVersion;
use std::path::PathBuf;

/// 1つのイメージバリアントをビルドするための作業単位
///
/// Prepper が実行ごとに1度だけ生成し、オーケストレータは変更せずに順に処理します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpecification {
    /// ビルド前に pull するベースイメージ
    pub base_image: DockerImage,
    /// Dockerfile を含むビルドコンテキスト
    pub build_folder: PathBuf,
    /// 出力先リポジトリ
    pub repository: String,
    pub version: AuroraVersion,
}
