//! bollard によるコンテナエンジン操作
//!
//! pull・ビルド・タグ付け・プッシュを Docker デーモンに対して実行します。

use crate::auth::{RegistryAuth, extract_registry};
use crate::context::ContextBuilder;
use crate::progress::EngineProgress;
use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::{BuildInfo, PushImageInfo};
use bytes::Bytes;
use colored::Colorize;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use shipflow_core::{Builder, DockerImage, EngineError, RegistryCredentials, split_image_tag};
use std::path::Path;

/// ビルド直後にイメージ ID を引くための一時タグのリポジトリ
const LOCAL_BUILD_REPOSITORY: &str = "shipflow-build";

pub struct DockerBuilder {
    docker: Docker,
    auth: RegistryAuth,
}

impl DockerBuilder {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            auth: RegistryAuth::new(),
        }
    }

    /// ローカルのデフォルト設定 (DOCKER_HOST / ソケット) で接続
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Connection(e.to_string()))?;
        Ok(Self::new(docker))
    }

    pub fn with_auth(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    fn credentials_for(
        &self,
        image: &str,
        explicit: Option<&RegistryCredentials>,
    ) -> Result<Option<DockerCredentials>, EngineError> {
        let credentials = match explicit {
            Some(creds) => Some(creds.clone()),
            None => self.auth.get_credentials(&extract_registry(image))?,
        };
        Ok(credentials.map(to_docker_credentials))
    }

    /// ビルド出力の処理
    fn handle_build_output(output: BuildInfo, progress: &EngineProgress) -> Result<(), EngineError> {
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::info!("{}", line);
                progress.set_message(line);
            }
        }

        if let Some(error) = output.error {
            return Err(EngineError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(EngineError::BuildFailed(error_msg));
        }

        if let Some(status) = output.status {
            tracing::debug!("{}", status);
        }

        Ok(())
    }

    async fn push_tag(
        &self,
        image: &str,
        tag: &str,
        credentials: Option<DockerCredentials>,
    ) -> Result<(), EngineError> {
        validate_tag(tag)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.to_string(),
        };

        let full_image = format!("{}:{}", image, tag);
        println!("  → {}", full_image.cyan());
        let progress = EngineProgress::new("Pushing", &full_image);

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(image, Some(options), credentials);

        let mut error_message: Option<String> = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        error_message = Some(err);
                    } else {
                        handle_push_progress(&info, &progress);
                    }
                }
                Err(e) => {
                    progress.finish_error(&e.to_string());
                    return Err(EngineError::PushFailed {
                        message: format!("{}: {}", full_image, e),
                    });
                }
            }
        }

        if let Some(err) = error_message {
            progress.finish_error(&err);
            return Err(EngineError::PushFailed {
                message: format!("{}: {}", full_image, err),
            });
        }

        progress.finish(&format!("{} {}", "✓".green(), full_image));
        Ok(())
    }
}

fn to_docker_credentials(creds: RegistryCredentials) -> DockerCredentials {
    DockerCredentials {
        username: Some(creds.username),
        password: Some(creds.password),
        serveraddress: Some(creds.server_address),
        ..Default::default()
    }
}

fn handle_push_progress(info: &PushImageInfo, progress: &EngineProgress) {
    if let Some(status) = &info.status {
        match status.as_str() {
            // 準備中は表示をスキップ（ノイズ軽減）
            "Preparing" | "Waiting" => {}
            _ => {
                let detail = info.progress.as_deref().unwrap_or("");
                progress.set_message(&format!("{} {}", status, detail));
            }
        }
    }
}

/// タグのバリデーション
///
/// Docker タグの制約: 128文字以下、英数字・ピリオド・ハイフン・アンダースコアのみ、
/// 先頭はピリオドまたはハイフンではない。
pub fn validate_tag(tag: &str) -> Result<(), EngineError> {
    if tag.is_empty() {
        return Err(EngineError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(EngineError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(EngineError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(EngineError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}

/// ビルドフォルダ名から一時タグを作る
fn local_build_tag(build_folder: &Path) -> String {
    let name: String = build_folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();
    let name = name.trim_start_matches(['.', '-']);
    let tag = if name.is_empty() { "latest" } else { name };
    format!("{}:{}", LOCAL_BUILD_REPOSITORY, tag)
}

#[async_trait]
impl Builder for DockerBuilder {
    async fn pull(&self, image: &DockerImage) -> Result<(), EngineError> {
        let from_image = image.name();
        tracing::info!("Pulling {}", image);
        let credentials = self.credentials_for(&from_image, None)?;

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: from_image.as_str(),
            tag: image.tag.as_str(),
            ..Default::default()
        };

        let progress = EngineProgress::new("Pulling", &image.to_string());

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, credentials);

        while let Some(info) = stream.next().await {
            match info {
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    progress: Some(detail),
                    ..
                }) => progress.set_message(&format!("{}: {}", status, detail)),
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    ..
                }) => progress.set_message(&status),
                Ok(_) => {}
                Err(e) => {
                    progress.finish_error(&e.to_string());
                    return Err(EngineError::PullFailed {
                        image: image.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        progress.finish(&format!("{} {}", "✓".green(), image));
        Ok(())
    }

    async fn build(&self, build_folder: &Path) -> Result<String, EngineError> {
        let context_data = ContextBuilder::create_context(build_folder)?;
        let local_tag = local_build_tag(build_folder);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: local_tag.as_str(),
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            ..Default::default()
        };
        tracing::debug!("Build options: {:?}", options);

        let progress = EngineProgress::new("Building", &build_folder.display().to_string());
        let body = Full::new(Bytes::from(context_data));

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let result = match msg {
                Ok(output) => Self::handle_build_output(output, &progress),
                Err(e) => Err(EngineError::BuildFailed(e.to_string())),
            };
            if let Err(e) = result {
                progress.finish_error(&e.to_string());
                return Err(e);
            }
        }

        let inspect = self
            .docker
            .inspect_image(&local_tag)
            .await
            .map_err(|e| EngineError::BuildFailed(format!("{}: {}", local_tag, e)))?;
        let image_id = inspect
            .id
            .ok_or_else(|| EngineError::BuildFailed(format!("{} has no image id", local_tag)))?;

        progress.finish(&format!("{} {}", "✓".green(), image_id));
        Ok(image_id)
    }

    async fn tag(&self, image_id: &str, tag: &str) -> Result<(), EngineError> {
        let (repo, name) = split_image_tag(tag);
        validate_tag(&name)?;

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo: repo.as_str(),
            tag: name.as_str(),
        };

        #[allow(deprecated)]
        self.docker
            .tag_image(image_id, Some(options))
            .await
            .map_err(|e| EngineError::TagFailed {
                image_id: image_id.to_string(),
                tag: tag.to_string(),
                message: e.to_string(),
            })
    }

    async fn push(
        &self,
        image_id: &str,
        tags: &[String],
        credentials: Option<&RegistryCredentials>,
    ) -> Result<(), EngineError> {
        tracing::debug!("Pushing {} with {} tag(s)", image_id, tags.len());
        for tag in tags {
            let (image, name) = split_image_tag(tag);
            let docker_credentials = self.credentials_for(&image, credentials)?;
            self.push_tag(&image, &name, docker_credentials).await?;
        }
        Ok(())
    }
}
