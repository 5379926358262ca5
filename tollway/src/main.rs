#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::path::Path;
use std::sync::Arc;

use args::{Args, Command, StreamMode};
use clap::Parser;
use tollway_config::{Config, ConfigHolder};
use tollway_core::RelayInfo;
use tollway_media::{Fetcher, ImageInfo, decode_base64_image};
use tollway_relay::tokenizer::count_text_tokens;
use tollway_relay::transcript::{TranscriptFormat, extract_transcript};
use tollway_relay::{StreamRelay, WriterSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let holder = ConfigHolder::new(load_config(&args.config)?);
    let config = holder.snapshot();

    tollway_telemetry::init(&config.telemetry)?;

    tracing::debug!(config_path = %args.config.display(), "configuration loaded");

    match args.command {
        Command::Replay {
            capture,
            mode,
            model,
            prompt_tokens,
            include_usage,
        } => replay(&config, &capture, mode, model, prompt_tokens, include_usage).await,
        Command::Sniff { url } => sniff(&config, &url).await,
        Command::Transcript { file, format, model } => transcript(&file, &format, &model).await,
    }
}

/// Read the config file, or fall back to defaults when it does not exist
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

async fn replay(
    config: &Config,
    capture: &Path,
    mode: StreamMode,
    model: String,
    prompt_tokens: u32,
    include_usage: bool,
) -> anyhow::Result<()> {
    let upstream = tokio::fs::File::open(capture)
        .await
        .map_err(|e| anyhow::anyhow!("failed to open capture {}: {e}", capture.display()))?;

    let info = RelayInfo::new(mode.into(), model, prompt_tokens).with_include_usage(include_usage);
    let mut sink = WriterSink::new(tokio::io::stdout());

    let usage = StreamRelay::from_config(&config.relay)
        .run(upstream, &info, &mut sink)
        .await?;

    tracing::info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "replay finished"
    );

    Ok(())
}

async fn sniff(config: &Config, url: &str) -> anyhow::Result<()> {
    let info: ImageInfo = if url.starts_with("data:") {
        decode_base64_image(url).await?
    } else {
        Fetcher::new(Arc::new(config.media.clone()))?.decode_url_image(url).await?
    };

    println!("{} {}x{}", info.mime_type(), info.width, info.height);
    Ok(())
}

async fn transcript(file: &Path, format: &str, model: &str) -> anyhow::Result<()> {
    let body = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", file.display()))?;

    let text = extract_transcript(TranscriptFormat::parse(format), &body)?;
    let tokens = count_text_tokens(&text, model);

    println!("{text}");
    println!("{tokens} tokens ({model})");
    Ok(())
}
