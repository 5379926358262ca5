//! Buffered upstream response handlers
//!
//! Each handler reads the whole upstream body, works out the usage to
//! bill, and rebuilds the caller's response from the upstream status,
//! headers, and (possibly patched) body.

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, StatusCode};
use tollway_core::{RelayInfo, Usage};

use crate::error::RelayError;
use crate::patch::apply_patch;
use crate::protocol::SimpleResponse;
use crate::transcript::{TranscriptFormat, extract_transcript};
use crate::usage::{reconcile_buffered, response_text_to_usage};

/// Headers recomputed for the caller instead of copied
fn is_recomputed(name: &HeaderName) -> bool {
    *name == CONTENT_LENGTH || *name == TRANSFER_ENCODING || *name == CONNECTION
}

/// Caller response for a buffered relay, with the usage to bill
#[derive(Debug)]
pub struct BufferedRelay {
    pub response: Response,
    pub usage: Usage,
}

/// Relay a buffered chat or completion response
///
/// # Errors
///
/// Fails when the body cannot be read, decoded, or patched, when the
/// upstream declared an error, or when no completion tokens can be counted.
pub async fn relay_buffered(upstream: reqwest::Response, info: &RelayInfo) -> Result<BufferedRelay, RelayError> {
    let (status, headers, body) = read_upstream(upstream).await?;

    let parsed: SimpleResponse =
        serde_json::from_slice(&body).map_err(|e| RelayError::decode("unmarshal_response_body_failed", e))?;

    let patched = apply_patch(&body, &info.upstream_model, info.prompt_tokens)?.into_owned();

    if let Some(error) = parsed.declared_error() {
        tracing::debug!(status = %status, error_type = %error.error_type, "upstream declared an error");
        return Err(RelayError::Upstream {
            status,
            error: error.clone(),
        });
    }

    let usage = reconcile_buffered(
        parsed.usage,
        &parsed.choice_texts(),
        &info.upstream_model,
        info.prompt_tokens,
    )?;

    Ok(BufferedRelay {
        response: passthrough(status, &headers, Bytes::from(patched)),
        usage,
    })
}

/// Relay a text-to-speech response; only the prompt is billed
///
/// # Errors
///
/// Fails when the upstream body cannot be read
pub async fn relay_speech(upstream: reqwest::Response, info: &RelayInfo) -> Result<BufferedRelay, RelayError> {
    let (status, headers, body) = read_upstream(upstream).await?;

    Ok(BufferedRelay {
        response: passthrough(status, &headers, body),
        usage: Usage::prompt_only(info.prompt_tokens),
    })
}

/// Relay a speech-to-text response, billing the transcript as completion
///
/// `response_format` defaults to `json`. A transcript that cannot be
/// extracted is billed as empty.
///
/// # Errors
///
/// Fails when the upstream body cannot be read
pub async fn relay_transcription(
    upstream: reqwest::Response,
    info: &RelayInfo,
    response_format: Option<&str>,
) -> Result<BufferedRelay, RelayError> {
    let (status, headers, body) = read_upstream(upstream).await?;

    let format = TranscriptFormat::parse(response_format.unwrap_or("json"));
    let transcript = extract_transcript(format, &body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, ?format, "failed to extract transcript");
        String::new()
    });

    Ok(BufferedRelay {
        response: passthrough(status, &headers, body),
        usage: response_text_to_usage(&transcript, &info.upstream_model, info.prompt_tokens),
    })
}

async fn read_upstream(upstream: reqwest::Response) -> Result<(StatusCode, HeaderMap, Bytes), RelayError> {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let body = upstream
        .bytes()
        .await
        .map_err(|e| RelayError::io("read_response_body_failed", e))?;

    Ok((status, headers, body))
}

fn passthrough(status: StatusCode, upstream_headers: &HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for name in upstream_headers.keys() {
        if is_recomputed(name) {
            continue;
        }
        if let Some(value) = upstream_headers.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    response
}
