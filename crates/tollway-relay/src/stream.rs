//! Stream relay engine
//!
//! A reader task splits the upstream body into frames and hands them over a
//! capacity-1 channel. The orchestrator holds the newest frame back by one
//! position so the terminal usage frame can be suppressed or followed by a
//! reconciled one, then appends `[DONE]`.

use std::pin::Pin;
use std::time::Duration;

use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HeaderValue};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tollway_config::RelayConfig;
use tollway_core::{RelayInfo, Usage};

use crate::aggregate::collect_stream_text;
use crate::error::RelayError;
use crate::frame::{Frame, parse_frame, trim_line_end};
use crate::protocol::{ChatStreamChunk, FinalUsageChunk};
use crate::sink::{ChannelSink, EventSink};
use crate::usage::{is_valid, reconcile_stream};

/// End-of-stream marker written to the caller
const DONE: &str = "[DONE]";
/// Events buffered between the relay task and the response body
const OUTBOUND_CAPACITY: usize = 8;
/// Longest upstream line accepted; a longer one ends the stream
const MAX_LINE_BYTES: usize = 64 * 1024;

/// What the reader saw on one upstream line
#[derive(Debug)]
enum ReadEvent {
    /// Stripped event payload
    Frame(String),
    /// An insignificant line; only resets the inactivity timer
    Heartbeat,
}

/// Identity of the stream, taken from its last frame
#[derive(Debug, Default)]
struct StreamIdentity {
    id: String,
    created: i64,
    model: String,
    system_fingerprint: Option<String>,
}

/// Caller side of a relay; goes quiet after the first failed write
struct Outbound<'a, S: ?Sized> {
    sink: &'a mut S,
    cancel: &'a CancellationToken,
    closed: bool,
}

impl<S: EventSink + ?Sized> Outbound<'_, S> {
    async fn send(&mut self, payload: &str) {
        if self.closed {
            return;
        }

        if let Err(e) = self.sink.send_data(payload).await {
            tracing::warn!(error = %e, "caller write failed, stopping relay");
            self.closed = true;
            self.cancel.cancel();
        }
    }
}

/// Relays one upstream event stream to one caller
#[derive(Debug, Clone, Copy)]
pub struct StreamRelay {
    idle_timeout: Duration,
}

impl StreamRelay {
    /// Create a relay that gives up after `idle_timeout` without a line
    pub const fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub const fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.streaming_timeout)
    }

    /// Forward `upstream` to `sink` and return the usage to bill
    ///
    /// Events go out in upstream order, one position late. Upstream usage on
    /// the last frame is used when valid; otherwise usage is counted from
    /// the forwarded text. A caller disconnect stops forwarding but still
    /// yields usage for what the upstream produced.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StreamTimeout`] if the upstream goes quiet for
    /// longer than the inactivity timeout. No `[DONE]` is written then.
    pub async fn run<R, S>(&self, upstream: R, info: &RelayInfo, sink: &mut S) -> Result<Usage, RelayError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        S: EventSink + ?Sized,
    {
        let cancel = CancellationToken::new();
        let _stop_reader = cancel.clone().drop_guard();

        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(read_frames(upstream, info.clone(), tx, cancel.clone()));

        let mut out = Outbound {
            sink,
            cancel: &cancel,
            closed: false,
        };
        let mut events = Vec::new();
        let mut held: Option<String> = None;

        loop {
            let Ok(next) = tokio::time::timeout(self.idle_timeout, rx.recv()).await else {
                cancel.cancel();
                tracing::error!(
                    model = %info.upstream_model,
                    timeout = ?self.idle_timeout,
                    frames = events.len(),
                    "upstream stream timed out"
                );
                return Err(RelayError::StreamTimeout(self.idle_timeout));
            };

            let Some(event) = next else {
                break;
            };
            let ReadEvent::Frame(payload) = event else {
                continue;
            };

            events.push(payload.clone());
            if let Some(previous) = held.replace(payload) {
                out.send(&previous).await;
                if out.closed {
                    break;
                }
            }
        }

        let mut identity = StreamIdentity::default();
        let mut upstream_usage = None;

        if let Some(last) = held.as_deref() {
            match serde_json::from_str::<ChatStreamChunk>(last) {
                Ok(chunk) => {
                    upstream_usage = chunk.usage.filter(is_valid);
                    identity = StreamIdentity {
                        id: chunk.id,
                        created: chunk.created,
                        model: chunk.model,
                        system_fingerprint: chunk.system_fingerprint,
                    };
                }
                Err(e) => tracing::debug!(error = %e, "last stream frame is not a chat chunk"),
            }
        }

        let usage = if let Some(usage) = upstream_usage {
            if info.should_include_usage {
                if let Some(last) = held.as_deref() {
                    out.send(last).await;
                }
            } else {
                tracing::debug!("suppressing upstream usage frame");
            }
            usage
        } else {
            if let Some(last) = held.as_deref() {
                out.send(last).await;
            }

            let text = collect_stream_text(info.mode, &events);
            let usage = reconcile_stream(&text.text, &info.upstream_model, info.prompt_tokens, text.tool_calls);
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                tool_calls = text.tool_calls,
                "upstream stream carried no usage, counted locally"
            );

            if info.should_include_usage {
                send_final_usage(&mut out, &identity, info, usage).await;
            }
            usage
        };

        out.send(DONE).await;
        Ok(usage)
    }
}

async fn send_final_usage<S: EventSink + ?Sized>(
    out: &mut Outbound<'_, S>,
    identity: &StreamIdentity,
    info: &RelayInfo,
    usage: Usage,
) {
    let model = if identity.model.is_empty() {
        info.upstream_model.as_str()
    } else {
        identity.model.as_str()
    };

    let chunk = FinalUsageChunk {
        id: &identity.id,
        object: "chat.completion.chunk",
        created: identity.created,
        model,
        system_fingerprint: identity.system_fingerprint.as_deref(),
        choices: [],
        usage,
    };

    match serde_json::to_string(&chunk) {
        Ok(payload) => out.send(&payload).await,
        Err(e) => tracing::warn!(error = %e, "failed to encode final usage chunk"),
    }
}

async fn read_frames<R>(upstream: R, info: RelayInfo, tx: mpsc::Sender<ReadEvent>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(upstream);
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut bounded = (&mut reader).take(MAX_LINE_BYTES as u64);

        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = bounded.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) if line.len() >= MAX_LINE_BYTES && !line.ends_with(b"\n") => {
                tracing::warn!(limit = MAX_LINE_BYTES, "upstream line too long, ending stream");
                break;
            }
            Ok(_) => info.mark_first_response(),
            Err(e) => {
                tracing::warn!(error = %e, "upstream read failed, ending stream");
                break;
            }
        }

        let text = String::from_utf8_lossy(&line);
        let event = match parse_frame(trim_line_end(&text)) {
            Some(Frame::Done) => break,
            Some(Frame::Data(payload)) => ReadEvent::Frame(payload.to_owned()),
            None => ReadEvent::Heartbeat,
        };

        let sent = tokio::select! {
            () = cancel.cancelled() => break,
            sent = tx.send(event) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
}

/// Byte reader over a streamed `reqwest` response body
pub fn upstream_reader(response: reqwest::Response) -> impl AsyncRead + Send + Unpin + 'static {
    let body: Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>> =
        Box::pin(response.bytes_stream().map_err(std::io::Error::other));
    StreamReader::new(body)
}

/// Start relaying `upstream` and return the caller's SSE response right away
///
/// The returned handle resolves to the billed usage once the relay finishes.
pub fn sse_response<R>(
    upstream: R,
    info: RelayInfo,
    config: &RelayConfig,
) -> (Response, JoinHandle<Result<Usage, RelayError>>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let relay = StreamRelay::from_config(config);
    let (mut sink, body) = ChannelSink::new(OUTBOUND_CAPACITY);

    let handle = tokio::spawn(async move { relay.run(upstream, &info, &mut sink).await });

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    (response, handle)
}
