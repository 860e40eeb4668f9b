use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// コンテキストサイズの警告閾値 (500MB)
const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドフォルダ全体を tar.gz アーカイブにする
    ///
    /// Dockerfile はフォルダ直下にある前提です。
    pub fn create_context(build_folder: &Path) -> std::io::Result<Vec<u8>> {
        tracing::debug!("Creating build context from: {}", build_folder.display());

        let dockerfile = build_folder.join("Dockerfile");
        if !dockerfile.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Dockerfile not found: {}", dockerfile.display()),
            ));
        }

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);
            tar.append_dir_all(".", build_folder)?;
            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        Self::check_context_size(archive_data.len());

        Ok(archive_data)
    }

    fn check_context_size(size: usize) {
        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）",
                size / 1024 / 1024
            );
        }
    }
}
