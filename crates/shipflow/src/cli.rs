use clap::{Args, Parser, Subcommand};
use shipflow_config::{ApplicationType, ConfigInput};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shipflow")]
#[command(about = "成果物からコンテナイメージをビルドしてタグ付け・プッシュする", long_about = None)]
pub struct Cli {
    /// デバッグログを出力 (RUST_LOG が優先)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 成果物をダウンロードしてイメージをビルド・プッシュ
    Build(BuildArgs),
    /// バージョン情報を表示
    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// 成果物のグループ ID
    #[arg(long, env = "GROUP_ID")]
    pub group_id: Option<String>,

    /// 成果物のアーティファクト ID
    #[arg(long, env = "ARTIFACT_ID")]
    pub artifact_id: Option<String>,

    /// 成果物のバージョン (`-SNAPSHOT` 可)
    #[arg(long = "app-version", env = "VERSION")]
    pub version: Option<String>,

    /// 成果物の classifier (省略時は種類ごとのデフォルト)
    #[arg(long, env = "CLASSIFIER")]
    pub classifier: Option<String>,

    /// 成果物の種類 (java / nodejs)
    #[arg(long, env = "APPLICATION_TYPE")]
    pub application_type: Option<String>,

    /// ベースイメージのリポジトリ
    #[arg(long, env = "DOCKER_BASE_IMAGE")]
    pub base_image: Option<String>,

    /// DOCKER_BASE_IMAGE の旧名
    #[arg(long, env = "DOCKER_BASE_NAME", hide = true)]
    pub base_name: Option<String>,

    /// ベースイメージのバージョン
    #[arg(long, env = "DOCKER_BASE_VERSION")]
    pub base_version: Option<String>,

    /// プッシュ先レジストリ
    #[arg(long, env = "OUTPUT_REGISTRY")]
    pub output_registry: Option<String>,

    /// プッシュ先リポジトリ (省略時は `group/artifact`)
    #[arg(long, env = "OUTPUT_REPOSITORY")]
    pub output_repository: Option<String>,

    /// ベースイメージを pull するレジストリ
    #[arg(long, env = "INTERNAL_PULL_REGISTRY")]
    pub internal_pull_registry: Option<String>,

    /// 追加タグ (`latest,major,minor,patch`)
    #[arg(long, env = "PUSH_EXTRA_TAGS")]
    pub push_extra_tags: Option<String>,

    /// 固定タグ。指定するとバージョン由来のタグの代わりに使う (衝突確認は TAG_OVERWRITE のみで省略)
    #[arg(long, env = "TAG_WITH")]
    pub tag_with: Option<String>,

    /// 固定タグに追加タグも付与
    #[arg(long, env = "TAG_WITH_EXTRA_TAGS")]
    pub tag_with_extra_tags: bool,

    /// 既存の完全バージョンタグの上書きを許可
    #[arg(long, env = "TAG_OVERWRITE")]
    pub tag_overwrite: bool,

    /// ビルダー自身のバージョン
    #[arg(long, env = "APP_VERSION")]
    pub builder_version: Option<String>,

    /// タグ付けまで行い、プッシュしない
    #[arg(long, env = "NO_PUSH")]
    pub no_push: bool,

    /// 全体のタイムアウト (秒)
    #[arg(long, env = "BUILD_TIMEOUT")]
    pub build_timeout: Option<u64>,

    /// 来歴の送信先
    #[arg(long, env = "TRACE_URL")]
    pub trace_url: Option<String>,

    /// 来歴のコンテキスト
    #[arg(long, env = "TRACE_CONTEXT")]
    pub trace_context: Option<String>,

    /// アーティファクトリポジトリの URL (シークレットファイルより優先)
    #[arg(long, env = "NEXUS_URL")]
    pub nexus_url: Option<String>,

    /// アーティファクトリポジトリ認証情報の JSON ファイル
    #[arg(long, env = "REPOSITORY_SECRET")]
    pub repository_secret: Option<PathBuf>,

    /// 作業ディレクトリ (省略時は一時ディレクトリ)
    #[arg(long, env = "SHIPFLOW_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

impl BuildArgs {
    /// 設定の入力値に変換
    pub fn to_config_input(&self) -> shipflow_config::Result<ConfigInput> {
        let application_type = match self.application_type.as_deref() {
            Some(kind) => kind.parse::<ApplicationType>()?,
            None => ApplicationType::default(),
        };

        Ok(ConfigInput {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            classifier: self.classifier.clone(),
            application_type,
            base_image: self.base_image.clone().or_else(|| self.base_name.clone()),
            base_version: self.base_version.clone(),
            output_registry: self.output_registry.clone(),
            output_repository: self.output_repository.clone(),
            internal_pull_registry: self.internal_pull_registry.clone(),
            push_extra_tags: self.push_extra_tags.clone(),
            tag_with: self.tag_with.clone(),
            tag_with_extra_tags: self.tag_with_extra_tags,
            tag_overwrite: self.tag_overwrite,
            builder_version: self.builder_version.clone(),
            no_push: self.no_push,
            build_timeout_secs: self.build_timeout,
            trace_url: self.trace_url.clone(),
            trace_context: self.trace_context.clone(),
            repository_url: self.nexus_url.clone(),
            repository_secret: self.repository_secret.clone(),
        })
    }
}
