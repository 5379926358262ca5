use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tollway_core::RelayMode;

/// Tollway relay toolkit
#[derive(Debug, Parser)]
#[command(name = "tollway", about = "Billing-aware relay engine for OpenAI-compatible upstreams")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tollway.toml", env = "TOLLWAY_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Relay a captured upstream event stream to stdout and report its usage
    Replay {
        /// File holding the raw upstream SSE bytes
        capture: PathBuf,

        /// Protocol the capture was recorded under
        #[arg(long, value_enum, default_value_t = StreamMode::Chat)]
        mode: StreamMode,

        /// Model the upstream was asked for
        #[arg(long, default_value = "gpt-4o")]
        model: String,

        /// Prompt tokens already counted for the request
        #[arg(long, default_value_t = 0)]
        prompt_tokens: u32,

        /// Emit a trailing usage event
        #[arg(long)]
        include_usage: bool,
    },

    /// Report the format and dimensions of a remote or data-URL image
    Sniff {
        /// `http(s)://` or `data:` URL
        url: String,
    },

    /// Extract and count the transcript in a speech-to-text response body
    Transcript {
        /// File holding the upstream response body
        file: PathBuf,

        /// The `response_format` the request used
        #[arg(long, default_value = "json")]
        format: String,

        /// Model used for counting
        #[arg(long, default_value = "whisper-1")]
        model: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StreamMode {
    Chat,
    Completion,
}

impl From<StreamMode> for RelayMode {
    fn from(mode: StreamMode) -> Self {
        match mode {
            StreamMode::Chat => Self::ChatCompletions,
            StreamMode::Completion => Self::Completions,
        }
    }
}
