//! `OpenAI` wire format types read from upstream responses
//!
//! Every field is defaulted: upstream payloads are decoded for accounting,
//! and a missing or `null` field must never turn a usable frame into a
//! decode failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tollway_core::Usage;
use tollway_core::de::null_as_default;

// -- Streaming types --

/// Chat completion streaming chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatStreamChunk {
    /// Chunk identifier
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Creation timestamp
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    /// Model that produced the chunk
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    /// Backend configuration fingerprint
    #[serde(default)]
    pub system_fingerprint: Option<String>,
    /// Delta choices
    #[serde(default)]
    pub choices: Option<Vec<ChatStreamChoice>>,
    /// Usage (present on the final chunk when the upstream reports it)
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Choice within a chat streaming chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatStreamChoice {
    /// Incremental delta
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: ChatStreamDelta,
}

/// Delta content within a streaming choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatStreamDelta {
    /// Text content (string or array of content parts)
    #[serde(default)]
    pub content: Option<Value>,
    /// Incremental tool calls
    #[serde(default)]
    pub tool_calls: Option<Vec<StreamToolCall>>,
}

/// Tool call fragment within a streaming delta
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamToolCall {
    /// Partial function call
    #[serde(default)]
    pub function: Option<StreamFunctionCall>,
}

/// Partial function call within a streaming tool call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name (first fragment only)
    #[serde(default)]
    pub name: Option<String>,
    /// Incremental arguments fragment
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Legacy text completion streaming chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionStreamChunk {
    /// Delta choices
    #[serde(default)]
    pub choices: Option<Vec<CompletionStreamChoice>>,
}

/// Choice within a text completion streaming chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionStreamChoice {
    /// Generated text fragment
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
}

/// Synthetic final chunk carrying reconciled usage
#[derive(Debug, Clone, Serialize)]
pub struct FinalUsageChunk<'a> {
    /// Identifier copied from the upstream stream
    pub id: &'a str,
    /// Object type (always "chat.completion.chunk")
    pub object: &'static str,
    /// Creation timestamp copied from the upstream stream
    pub created: i64,
    /// Effective model name
    pub model: &'a str,
    /// Backend fingerprint, when the upstream reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<&'a str>,
    /// Always empty
    pub choices: [Value; 0],
    /// Reconciled usage
    pub usage: Usage,
}

// -- Buffered response types --

/// Subset of a buffered chat completion needed for accounting
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleResponse {
    /// Generated choices
    #[serde(default)]
    pub choices: Option<Vec<SimpleChoice>>,
    /// Upstream-reported usage
    #[serde(default)]
    pub usage: Option<Usage>,
    /// Upstream-declared error
    #[serde(default)]
    pub error: Option<UpstreamErrorBody>,
}

/// Choice within a buffered response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleChoice {
    /// Generated message
    #[serde(default)]
    pub message: Option<SimpleMessage>,
}

/// Message within a buffered response choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleMessage {
    /// Text content (string or array of content parts)
    #[serde(default)]
    pub content: Option<Value>,
}

impl SimpleResponse {
    /// Upstream error, if the payload declares one
    pub fn declared_error(&self) -> Option<&UpstreamErrorBody> {
        self.error.as_ref().filter(|e| !e.error_type.is_empty())
    }

    /// Text content of each choice, in order
    pub fn choice_texts(&self) -> Vec<String> {
        self.choices
            .iter()
            .flatten()
            .map(|choice| {
                choice
                    .message
                    .as_ref()
                    .and_then(|m| m.content.as_ref())
                    .map(content_text)
                    .unwrap_or_default()
            })
            .collect()
    }
}

// -- Error types --

/// `OpenAI` error object, as declared by an upstream or rendered by Tollway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamErrorBody {
    /// Error message
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Error type
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub error_type: String,
    /// Parameter that caused the error
    #[serde(default)]
    pub param: Option<Value>,
    /// Error code
    #[serde(default)]
    pub code: Option<Value>,
}

/// `OpenAI` error response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<'a> {
    /// Error details
    pub error: &'a UpstreamErrorBody,
}

/// Flatten message content to plain text
///
/// Content is either a string or an array of parts; only `text` parts contribute.
pub fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect(),
        _ => String::new(),
    }
}
