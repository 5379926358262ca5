//! Response text recovered from buffered stream payloads

use serde::de::DeserializeOwned;
use tollway_core::RelayMode;

use crate::protocol::{ChatStreamChunk, CompletionStreamChunk, content_text};

/// Generated text and tool call count observed across a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamText {
    /// Concatenated delta text, including tool call names and arguments
    pub text: String,
    /// Largest number of tool calls carried by a single delta
    pub tool_calls: usize,
}

/// Rebuild the response text from every payload of a stream
///
/// Payloads are decoded together as one JSON array first. If that fails,
/// each payload is decoded on its own and malformed ones are skipped.
pub fn collect_stream_text(mode: RelayMode, events: &[String]) -> StreamText {
    match mode {
        RelayMode::ChatCompletions => {
            let chunks: Vec<ChatStreamChunk> = decode_batch(events);
            chat_text(&chunks)
        }
        RelayMode::Completions => {
            let chunks: Vec<CompletionStreamChunk> = decode_batch(events);
            StreamText {
                text: chunks
                    .iter()
                    .flat_map(|chunk| chunk.choices.iter().flatten())
                    .map(|choice| choice.text.as_str())
                    .collect(),
                tool_calls: 0,
            }
        }
        RelayMode::AudioTranscription | RelayMode::AudioSpeech => StreamText::default(),
    }
}

fn decode_batch<T: DeserializeOwned>(events: &[String]) -> Vec<T> {
    let joined = format!("[{}]", events.join(","));

    match serde_json::from_str(&joined) {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(error = %e, events = events.len(), "batch decode of stream payloads failed, decoding one by one");

            events
                .iter()
                .filter_map(|event| {
                    serde_json::from_str(event)
                        .inspect_err(|e| tracing::warn!(error = %e, "skipping malformed stream payload"))
                        .ok()
                })
                .collect()
        }
    }
}

fn chat_text(chunks: &[ChatStreamChunk]) -> StreamText {
    let mut out = StreamText::default();

    for choice in chunks.iter().flat_map(|chunk| chunk.choices.iter().flatten()) {
        let delta = &choice.delta;

        if let Some(content) = &delta.content {
            out.text.push_str(&content_text(content));
        }

        if let Some(tool_calls) = &delta.tool_calls {
            out.tool_calls = out.tool_calls.max(tool_calls.len());

            for function in tool_calls.iter().filter_map(|call| call.function.as_ref()) {
                if let Some(name) = &function.name {
                    out.text.push_str(name);
                }
                if let Some(arguments) = &function.arguments {
                    out.text.push_str(arguments);
                }
            }
        }
    }

    out
}
