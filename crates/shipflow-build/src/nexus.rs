//! アーティファクトのダウンロード
//!
//! Maven リポジトリレイアウト (`group/as/path/artifact/version/file`) から成果物を
//! 作業ディレクトリへ保存し、SHA-1 を計算します。

use async_trait::async_trait;
use regex::Regex;
use sha1::{Digest, Sha1};
use shipflow_core::{
    ArtifactCoordinates, Deliverable, DownloadError, Downloader, RepositoryAccess, SNAPSHOT_MARKER,
};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;

static SNAPSHOT_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<timestamp>\s*([0-9.]+)\s*</timestamp>").expect("timestamp pattern is valid")
});
static SNAPSHOT_BUILD_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<buildNumber>\s*(\d+)\s*</buildNumber>").expect("build number pattern is valid")
});

pub struct NexusDownloader {
    client: reqwest::Client,
    work_dir: PathBuf,
}

impl NexusDownloader {
    pub fn new(client: reqwest::Client, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            work_dir: work_dir.into(),
        }
    }

    async fn get(
        &self,
        url: &str,
        access: &RepositoryAccess,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url);
        if !access.username.is_empty() {
            request = request.basic_auth(&access.username, Some(&access.password));
        }
        tracing::debug!("GET {}", url);

        let response = request.send().await.map_err(|e| DownloadError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadError::NotFound(url.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DownloadError::Unauthorized {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(DownloadError::Request {
                url: url.to_string(),
                message: format!("unexpected status {}", status),
            });
        }
        Ok(response)
    }

    /// スナップショットのタイムスタンプ付きバージョンを解決
    async fn resolve_snapshot(
        &self,
        base_url: &str,
        coordinates: &ArtifactCoordinates,
        access: &RepositoryAccess,
    ) -> Result<String, DownloadError> {
        let url = format!("{}/maven-metadata.xml", base_url);
        let metadata = self
            .get(&url, access)
            .await?
            .text()
            .await
            .map_err(|e| DownloadError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        timestamp_version(&coordinates.version, &metadata)
            .ok_or_else(|| DownloadError::SnapshotMetadata(coordinates.to_string()))
    }

    /// レスポンスをファイルへ書き出しながら SHA-1 を計算
    async fn save(
        &self,
        mut response: reqwest::Response,
        url: &str,
        destination: &Path,
    ) -> Result<String, DownloadError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let mut file = tokio::fs::File::create(destination).await?;
        let mut hasher = Sha1::new();

        while let Some(chunk) = response.chunk().await.map_err(|e| DownloadError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(hex::encode(hasher.finalize()))
    }
}

/// `maven-metadata.xml` から `1.0-SNAPSHOT` を `1.0-20240101.120000-3` に置き換える
fn timestamp_version(version: &str, metadata: &str) -> Option<String> {
    let timestamp = SNAPSHOT_TIMESTAMP.captures(metadata)?.get(1)?.as_str();
    let build_number = SNAPSHOT_BUILD_NUMBER.captures(metadata)?.get(1)?.as_str();
    Some(version.replace(
        SNAPSHOT_MARKER,
        &format!("{}-{}", timestamp, build_number),
    ))
}

/// 成果物のディレクトリ URL
fn artifact_base_url(repository_url: &str, coordinates: &ArtifactCoordinates) -> String {
    format!(
        "{}/{}",
        repository_url.trim_end_matches('/'),
        coordinates.directory_path()
    )
}

#[async_trait]
impl Downloader for NexusDownloader {
    async fn download_artifact(
        &self,
        coordinates: &ArtifactCoordinates,
        access: &RepositoryAccess,
    ) -> Result<Deliverable, DownloadError> {
        if access.url.is_empty() {
            return Err(DownloadError::Request {
                url: String::new(),
                message: "no artifact repository URL configured".to_string(),
            });
        }
        let base_url = artifact_base_url(&access.url, coordinates);

        let resolved_version = if coordinates.is_snapshot() {
            let resolved = self.resolve_snapshot(&base_url, coordinates, access).await?;
            tracing::info!("Resolved snapshot {} to {}", coordinates.version, resolved);
            Some(resolved)
        } else {
            None
        };

        let file_name =
            coordinates.file_name(resolved_version.as_deref().unwrap_or(&coordinates.version));
        let url = format!("{}/{}", base_url, file_name);
        let destination = self.work_dir.join(&file_name);

        let response = self.get(&url, access).await?;
        let sha1 = self.save(response, &url, &destination).await?;
        tracing::debug!(sha1 = %sha1, "Saved {}", destination.display());

        let deliverable = Deliverable::new(destination, sha1);
        Ok(match resolved_version {
            Some(version) => deliverable.with_resolved_version(version),
            None => deliverable,
        })
    }
}
