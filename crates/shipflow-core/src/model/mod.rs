//! モデル定義
//!
//! 1回のビルド実行の中で生成・消費される値型を定義します。
//! いずれも実行をまたいで永続化されません。

mod artifact;
mod config;
mod image;
mod specification;
mod version;

// Re-exports
pub use artifact::*;
pub use config::*;
pub use image::*;
pub use specification::*;
pub use version::*;
