//! Spoken text extraction from speech-to-text responses

use serde::Deserialize;
use thiserror::Error;

/// Subtitle cue timing separator
const CUE_ARROW: &str = "-->";

/// Output format requested from a transcription upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    Json,
    Text,
    Srt,
    VerboseJson,
    Vtt,
    /// Anything else; extraction yields no text
    Unknown,
}

impl TranscriptFormat {
    /// Parse a `response_format` value
    pub fn parse(format: &str) -> Self {
        match format {
            "json" => Self::Json,
            "text" => Self::Text,
            "srt" => Self::Srt,
            "verbose_json" => Self::VerboseJson,
            "vtt" => Self::Vtt,
            _ => Self::Unknown,
        }
    }
}

/// Errors from reading a transcription body
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// A JSON format body could not be decoded
    #[error("failed to decode transcription body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// `json` and `verbose_json` bodies; verbose metadata is ignored
#[derive(Debug, Deserialize)]
struct TextResponse {
    #[serde(default)]
    text: String,
}

/// Extract the spoken text from a transcription body
///
/// Subtitle formats keep only the line after each cue timing, joined
/// without separators.
///
/// # Errors
///
/// Returns an error when a JSON format body does not decode
pub fn extract_transcript(format: TranscriptFormat, body: &[u8]) -> Result<String, TranscriptError> {
    let text = match format {
        TranscriptFormat::Json | TranscriptFormat::VerboseJson => serde_json::from_slice::<TextResponse>(body)?.text,
        TranscriptFormat::Text => {
            let text = String::from_utf8_lossy(body);
            text.strip_suffix('\n').unwrap_or(&*text).to_owned()
        }
        TranscriptFormat::Srt | TranscriptFormat::Vtt => cue_text(&String::from_utf8_lossy(body)),
        TranscriptFormat::Unknown => String::new(),
    };

    Ok(text)
}

fn cue_text(body: &str) -> String {
    let mut text = String::new();
    let mut lines = body.lines();

    while let Some(line) = lines.next() {
        if line.contains(CUE_ARROW)
            && let Some(spoken) = lines.next()
        {
            text.push_str(spoken);
        }
    }

    text
}
