//! レジストリ メタデータクライアント
//!
//! Docker Registry HTTP API v2 でタグ一覧・マニフェスト・イメージ設定を取得します。

use async_trait::async_trait;
use serde::Deserialize;
use shipflow_core::{ExistingTags, ImageInfo, ImageInfoProvider, RegistryCredentials, RegistryError};
use std::collections::{HashMap, HashSet};

const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// イメージ設定内でベースイメージの完全バージョンを持つ環境変数
pub const IMAGE_VERSION_ENV: &str = "IMAGE_VERSION";

#[derive(Debug, Deserialize)]
struct Manifest {
    config: Descriptor,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
}

/// `tags/list` のレスポンス。空のリポジトリでは tags が null になる
#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// `Link: <...>; rel="next"` から次ページの URL を取り出す
///
/// 相対パスは `base_url` (スキーム + ホスト) を前置します。
fn next_page_url(base_url: &str, link: &str) -> Option<String> {
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params.split(';').any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .is_some_and(|rel| rel.trim_matches('"') == "next")
        });
        if !is_next {
            return None;
        }

        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        if target.starts_with("http://") || target.starts_with("https://") {
            Some(target.to_string())
        } else {
            Some(format!("{}/{}", base_url, target.trim_start_matches('/')))
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    config: ContainerConfig,
}

pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<RegistryCredentials>,
}

impl RegistryClient {
    /// `base_url` はスキーム付き (`https://registry:5000`)
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<RegistryCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, repository: &str, path: &str) -> String {
        format!("{}/v2/{}/{}", self.base_url, repository, path)
    }

    async fn get(&self, url: &str, accept: Option<&str>) -> Result<reqwest::Response, RegistryError> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        tracing::debug!("GET {}", url);
        request.send().await.map_err(|e| RegistryError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// マニフェストを取得し、(マニフェストのダイジェスト, 設定 blob のダイジェスト) を返す
    async fn manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<(String, String), RegistryError> {
        let url = self.url(repository, &format!("manifests/{}", reference));
        let response = self
            .get(&url, Some(&format!("{}, {}", MANIFEST_V2, OCI_MANIFEST)))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::ManifestNotFound {
                repository: repository.to_string(),
                reference: reference.to_string(),
            });
        }
        let response = error_for_status(&url, response)?;

        let digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let manifest: Manifest = response.json().await.map_err(|e| invalid(&url, e))?;

        // ダイジェストで参照された場合はヘッダがなくても参照そのものがダイジェスト
        let digest = match digest {
            Some(d) => d,
            None if reference.starts_with("sha256:") => reference.to_string(),
            None => {
                return Err(RegistryError::InvalidResponse {
                    url,
                    message: format!("missing {} header", DIGEST_HEADER),
                });
            }
        };
        Ok((digest, manifest.config.digest))
    }

    async fn config_blob(
        &self,
        repository: &str,
        config_digest: &str,
    ) -> Result<serde_json::Value, RegistryError> {
        let url = self.url(repository, &format!("blobs/{}", config_digest));
        let response = error_for_status(&url, self.get(&url, None).await?)?;
        response.json().await.map_err(|e| invalid(&url, e))
    }
}

fn error_for_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RegistryError::Request {
            url: url.to_string(),
            message: format!("unexpected status {}", status),
        })
    }
}

fn invalid(url: &str, error: reqwest::Error) -> RegistryError {
    RegistryError::InvalidResponse {
        url: url.to_string(),
        message: error.to_string(),
    }
}

/// イメージ設定から ImageInfo を組み立てる
///
/// `IMAGE_VERSION` がなければ問い合わせた参照を完全バージョンとして使います。
fn image_info_from_config(
    reference: &str,
    digest: String,
    config: &serde_json::Value,
) -> Result<ImageInfo, serde_json::Error> {
    let parsed = ImageConfig::deserialize(config)?;
    let env: HashMap<String, String> = parsed
        .config
        .env
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let complete_base_image_version = env
        .get(IMAGE_VERSION_ENV)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| reference.to_string());

    Ok(ImageInfo {
        digest,
        complete_base_image_version,
        labels: parsed.config.labels.unwrap_or_default(),
        env,
    })
}

#[async_trait]
impl ImageInfoProvider for RegistryClient {
    async fn get_image_info(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<ImageInfo, RegistryError> {
        let (digest, config_digest) = self.manifest(repository, reference).await?;
        let config = self.config_blob(repository, &config_digest).await?;
        image_info_from_config(reference, digest, &config).map_err(|e| {
            RegistryError::InvalidResponse {
                url: self.url(repository, &format!("blobs/{}", config_digest)),
                message: e.to_string(),
            }
        })
    }

    async fn get_image_config(
        &self,
        repository: &str,
        digest: &str,
    ) -> Result<serde_json::Value, RegistryError> {
        let (_, config_digest) = self.manifest(repository, digest).await?;
        self.config_blob(repository, &config_digest).await
    }

    /// `Link` ヘッダのページングを最後までたどって全タグを集める
    async fn get_tags(&self, repository: &str) -> Result<ExistingTags, RegistryError> {
        let mut existing = ExistingTags {
            name: repository.to_string(),
            tags: Vec::new(),
        };
        let mut next = Some(self.url(repository, "tags/list"));
        let mut visited = HashSet::new();

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                tracing::warn!("Tag list pagination loops back to {}", url);
                break;
            }

            let response = self.get(&url, None).await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!("Repository {} does not exist yet", repository);
                break;
            }
            let response = error_for_status(&url, response)?;

            next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(|link| next_page_url(&self.base_url, link));

            let page: TagList = response.json().await.map_err(|e| invalid(&url, e))?;
            if !page.name.is_empty() {
                existing.name = page.name;
            }
            existing.tags.extend(page.tags.unwrap_or_default());
        }

        Ok(existing)
    }
}
