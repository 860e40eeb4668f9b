mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{BuildArgs, Cli, Commands};
use colored::Colorize;
use shipflow_build::{
    BuildPipeline, BuildReport, Cancellation, Collaborators, DockerBuilder, DockerfilePrepper,
    HttpTracer, NexusDownloader, RegistryAuth, RegistryClient,
};
use shipflow_core::{NoopTracer, RunConfig, Tracer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Build(args) => build(args).await,
        Commands::Version => {
            println!("shipflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn build(args: BuildArgs) -> anyhow::Result<()> {
    let config = args
        .to_config_input()
        .and_then(|input| input.resolve())
        .context("設定の読み込みに失敗しました")?;
    tracing::debug!("Config: {:?}", config);

    // 作業ディレクトリ。一時ディレクトリは実行終了時に削除される
    let temp_dir = match &args.work_dir {
        Some(_) => None,
        None => Some(
            tempfile::Builder::new()
                .prefix("shipflow-")
                .tempdir()
                .context("作業ディレクトリを作成できません")?,
        ),
    };
    let work_dir = args
        .work_dir
        .clone()
        .or_else(|| temp_dir.as_ref().map(|dir| dir.path().to_path_buf()))
        .context("作業ディレクトリが決まりません")?;

    let pipeline = wire(config, &work_dir)?;

    let (handle, cancellation) = Cancellation::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling build");
            handle.cancel();
        }
    });

    match pipeline.run(&cancellation).await {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e.user_message());
            // process::exit はデストラクタを実行しないので先に片付ける
            drop(temp_dir);
            std::process::exit(1);
        }
    }
}

/// 本番用のコラボレータを組み立てる
fn wire(config: RunConfig, work_dir: &Path) -> anyhow::Result<BuildPipeline> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("shipflow/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("HTTP クライアントを初期化できません")?;

    let auth = RegistryAuth::new();
    let pull_credentials = auth
        .get_credentials(&config.docker.internal_pull_registry)
        .context("プル用レジストリの認証情報を取得できません")?;
    let push_credentials = auth
        .get_credentials(&config.docker.output_registry)
        .context("プッシュ先レジストリの認証情報を取得できません")?;

    let tracer: Arc<dyn Tracer> = if config.trace.is_enabled() {
        Arc::new(HttpTracer::new(http.clone(), &config.trace))
    } else {
        Arc::new(NoopTracer)
    };

    let collaborators = Collaborators {
        downloader: Arc::new(NexusDownloader::new(http.clone(), work_dir.join("deliverable"))),
        prepper: Arc::new(DockerfilePrepper::new(work_dir)),
        builder: Arc::new(DockerBuilder::connect().context("Docker に接続できません")?),
        provider: Arc::new(
            RegistryClient::new(http, config.docker.internal_pull_registry.clone())
                .with_credentials(pull_credentials),
        ),
        tracer,
    };

    Ok(BuildPipeline::new(config, collaborators).with_credentials(push_credentials))
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("{} {}", "✓ Build completed:".green().bold(), report.version);
    for image in &report.images {
        let state = if image.pushed {
            "pushed".green()
        } else {
            "local only".yellow()
        };
        println!("  {} ({}) [{}]", image.image.cyan(), image.image_id, state);
        for tag in image.tags.iter() {
            println!("    - {}", tag.tag);
        }
    }
}
