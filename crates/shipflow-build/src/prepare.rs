//! ビルドコンテキストの準備
//!
//! 成果物を `app/` に展開し、Tera で Dockerfile を生成します。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use shipflow_core::{
    AuroraVersion, BaseImage, BuildSpecification, Deliverable, Packaging, PrepareError, Prepper,
    RunConfig,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

/// ビルドコンテキスト内の成果物ディレクトリ
pub const APP_DIR: &str = "app";

const JAVA_DOCKERFILE: &str = r#"FROM {{ base_image }}

LABEL {% for key, value in labels %}{{ key }}="{{ value }}" {% endfor %}

COPY ./app /u01
RUN chmod -R 777 /u01/

ENV {% for key, value in env %}{{ key }}="{{ value }}" {% endfor %}

CMD ["bin/run"]
"#;

const NODEJS_DOCKERFILE: &str = r#"FROM {{ base_image }}

LABEL {% for key, value in labels %}{{ key }}="{{ value }}" {% endfor %}

COPY ./app /u01/application

ENV {% for key, value in env %}{{ key }}="{{ value }}" {% endfor %}

WORKDIR "/u01/"

CMD ["/u01/bin/run_nginx"]
"#;

pub struct DockerfilePrepper {
    work_dir: PathBuf,
    build_time: Option<DateTime<Utc>>,
}

impl DockerfilePrepper {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            build_time: None,
        }
    }

    /// `IMAGE_BUILD_TIME` を固定
    pub fn with_build_time(mut self, build_time: DateTime<Utc>) -> Self {
        self.build_time = Some(build_time);
        self
    }

    fn render(
        &self,
        config: &RunConfig,
        version: &AuroraVersion,
        base_image: &BaseImage,
    ) -> Result<String, PrepareError> {
        let build_time = self.build_time.unwrap_or_else(Utc::now);

        let mut labels = BTreeMap::new();
        labels.insert("version", version.declared_version().to_string());
        labels.insert("aurora.version", version.complete_version());

        let mut env = BTreeMap::new();
        env.insert("APP_VERSION", version.app_version().to_string());
        env.insert("AURORA_VERSION", version.complete_version());
        env.insert(
            "IMAGE_BUILD_TIME",
            build_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        env.insert("PUSH_EXTRA_TAGS", config.docker.push_extra_tags.to_string());
        if version.is_snapshot() {
            env.insert("SNAPSHOT_TAG", version.declared_version().to_string());
        }

        let mut context = Context::new();
        context.insert("base_image", &base_image.image.to_string());
        context.insert("labels", &labels);
        context.insert("env", &env);

        let template = match config.application.packaging {
            Packaging::Zip => JAVA_DOCKERFILE,
            Packaging::Tgz => NODEJS_DOCKERFILE,
        };
        Tera::default()
            .render_str(template, &context)
            .map_err(|e| PrepareError::Template(tera_error_detail(&e)))
    }
}

/// Tera のエラーチェーンを1行にまとめる
fn tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    details.join(" | ")
}

/// 成果物をパッケージ形式に応じて展開
fn unpack_deliverable(
    deliverable: &Path,
    packaging: Packaging,
    destination: &Path,
) -> Result<(), PrepareError> {
    std::fs::create_dir_all(destination)?;
    let file = File::open(deliverable)?;

    match packaging {
        Packaging::Tgz => {
            let decoder = flate2::read::GzDecoder::new(file);
            tar::Archive::new(decoder).unpack(destination)?;
        }
        Packaging::Zip => {
            let mut archive = zip::ZipArchive::new(file).map_err(|e| {
                PrepareError::UnsupportedDeliverable(format!("{}: {}", deliverable.display(), e))
            })?;
            archive.extract(destination).map_err(|e| {
                PrepareError::UnsupportedDeliverable(format!("{}: {}", deliverable.display(), e))
            })?;
        }
    }
    Ok(())
}

/// 完全バージョンをディレクトリ名に使える形へ
fn folder_name(version: &AuroraVersion) -> String {
    let name: String = version
        .complete_version()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("build-{}", name)
}

#[async_trait]
impl Prepper for DockerfilePrepper {
    async fn prepare(
        &self,
        config: &RunConfig,
        version: &AuroraVersion,
        deliverable: &Deliverable,
        base_image: &BaseImage,
    ) -> Result<Vec<BuildSpecification>, PrepareError> {
        let build_folder = self.work_dir.join(folder_name(version));
        if build_folder.exists() {
            std::fs::remove_dir_all(&build_folder)?;
        }
        std::fs::create_dir_all(&build_folder)?;

        tracing::debug!(
            "Unpacking {} into {}",
            deliverable.path.display(),
            build_folder.display()
        );
        unpack_deliverable(
            &deliverable.path,
            config.application.packaging,
            &build_folder.join(APP_DIR),
        )?;

        let dockerfile = self.render(config, version, base_image)?;
        tracing::debug!("Dockerfile:\n{}", dockerfile);
        std::fs::write(build_folder.join("Dockerfile"), dockerfile)?;

        Ok(vec![BuildSpecification {
            base_image: base_image.image.clone(),
            build_folder,
            repository: config.docker.output_repository.clone(),
            version: version.clone(),
        }])
    }
}
