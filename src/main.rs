mod api;
mod captions;
mod config;
mod error;
mod history;
mod item;
mod pipeline;
mod publish;
mod source;
mod tool;
mod upload;
mod video;

use anyhow::Context;
use api::{GoogleTranslator, QwenClient, Translator};
use captions::WhisperCaptioner;
use clap::Parser;
use config::{Args, Config, SourceConfig};
use history::HistoryLedger;
use pipeline::{Pipeline, PipelineOptions};
use source::{ChannelSource, LocalSource, RemoteSource, Source};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use upload::{Uploader, YouTubeUploader};
use video::FfmpegBurner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，RUST_LOG 可覆盖默认级别
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // 加载环境变量
    dotenvy::dotenv().ok();

    // 解析命令行参数
    let args = Args::parse();

    // 只创建示例目录，不需要任何凭据
    if let Some(name) = args.create_sample.as_deref() {
        let folder = LocalSource::new(&args.videos_dir)
            .create_sample(name)
            .await
            .context("Failed to create sample folder")?;
        println!("Sample folder created: {}", folder.display());
        println!("Put video.mp4 in it and edit metadata.json before running.");
        return Ok(());
    }

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting auto-reshare...");
    if config.dry_run {
        info!("Dry run: nothing will be uploaded or recorded");
    }

    let mut pipeline = build_pipeline(&config).context("Failed to set up pipeline")?;
    let summary = pipeline.run().await;

    info!(
        "Run finished: {} processed, {} duplicate(s), {} failed",
        summary.processed, summary.duplicates, summary.failed
    );
    info!(
        "History at {} now holds {} id(s)",
        pipeline.ledger().path().display(),
        pipeline.ledger().record().downloaded_ids.len()
    );
    if summary.failed > 0 && summary.processed == 0 {
        error!("No video was processed successfully");
    }
    Ok(())
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    // 1. 视频来源
    let source = match &config.source {
        SourceConfig::Local { videos_dir } => {
            info!("Using local videos from {}", videos_dir.display());
            Source::Local(LocalSource::new(videos_dir))
        }
        SourceConfig::Remote { url } => {
            info!("Using remote listing at {}", url);
            Source::Remote(RemoteSource::new(url, &config.download_dir, client.clone()))
        }
        SourceConfig::Channel { url, scan_window } => {
            info!("Using channel {}", url);
            Source::Channel(ChannelSource::new(
                url.as_str(),
                &config.download_dir,
                *scan_window,
                config.tool_timeout,
            ))
        }
    };

    // 2. 处理历史
    let ledger = HistoryLedger::open(&config.history_path);
    info!(
        "Loaded history from {} ({} processed)",
        ledger.path().display(),
        ledger.record().downloaded_ids.len()
    );

    // 3. 字幕生成与烧录
    let mut captioner = WhisperCaptioner::new(
        config.openai_api_key.clone(),
        config.whisper_model.clone(),
        client.clone(),
        config.tool_timeout,
    );
    if let Some(base) = &config.openai_api_base {
        captioner = captioner.with_api_base(base.as_str());
    }
    let burner = FfmpegBurner::new(config.tool_timeout).with_force_style(config.force_style.clone());

    // 4. 标题翻译：有 DashScope key 时用千问
    let translator: Box<dyn Translator> = match &config.dashscope_api_key {
        Some(key) => {
            info!("Translating metadata with {}", config.qwen_model);
            Box::new(QwenClient::new(key.clone(), client.clone()).with_model(config.qwen_model.as_str()))
        }
        None => {
            info!("Translating metadata with Google translate");
            Box::new(GoogleTranslator::new(client.clone()))
        }
    };

    // 5. 上传
    let uploader: Option<Box<dyn Uploader>> = config
        .youtube
        .clone()
        .map(|creds| Box::new(YouTubeUploader::new(creds, client.clone())) as Box<dyn Uploader>);

    Ok(Pipeline::new(
        source,
        ledger,
        Box::new(captioner),
        Box::new(burner),
        translator,
        uploader,
        PipelineOptions {
            limit: config.limit,
            threshold: config.threshold,
            privacy: config.privacy,
            dry_run: config.dry_run,
            default_tags: config.default_tags.clone(),
        },
    ))
}
