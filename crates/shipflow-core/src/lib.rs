//! Shipflow core
//!
//! ビルド成果物からコンテナイメージのタグを決定するためのドメインモデル。
//!
//! - **Version Model**: アーティファクト座標・Aurora バージョン・イメージ参照
//! - **Tag Resolver**: Aurora バージョンと追加タグ方針から完全修飾タグ列を生成
//! - **Collision Guard**: リリース済みバージョンの上書きを事前に検出
//! - **Provider**: オーケストレータが利用する外部コラボレータの契約

pub mod collision;
pub mod error;
pub mod model;
pub mod provider;
pub mod tagger;

pub use collision::ensure_not_published;
pub use error::*;
pub use model::*;
pub use provider::{
    Builder, Downloader, ImageInfoProvider, NoopTracer, Prepper, Tracer,
};
pub use tagger::{
    NormalTagResolver, ResolvedTag, SingleTagResolver, TagResolver, TagSet,
};
