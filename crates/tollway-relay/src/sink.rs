//! Caller-facing event sinks

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Errors from writing to the caller
#[derive(Debug, Error)]
pub enum SinkError {
    /// The caller went away
    #[error("caller disconnected")]
    Closed,

    /// Writing the event failed
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for outward stream events
///
/// Each payload is framed as `data: <payload>\n\n` and flushed before the
/// call returns.
#[async_trait]
pub trait EventSink: Send {
    /// Write one event
    async fn send_data(&mut self, payload: &str) -> Result<(), SinkError>;
}

fn frame(payload: &str) -> Bytes {
    Bytes::from(format!("data: {payload}\n\n"))
}

/// Sink feeding an HTTP response body through a bounded channel
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the response body it feeds
    ///
    /// The body ends when the sink is dropped.
    pub fn new(capacity: usize) -> (Self, Body) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            let chunk = rx.recv().await?;
            Some((Ok::<_, Infallible>(chunk), rx))
        });

        (Self { tx }, Body::from_stream(stream))
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send_data(&mut self, payload: &str) -> Result<(), SinkError> {
        self.tx.send(frame(payload)).await.map_err(|_| SinkError::Closed)
    }
}

/// Sink writing framed events to any async writer
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> EventSink for WriterSink<W> {
    async fn send_data(&mut self, payload: &str) -> Result<(), SinkError> {
        self.writer.write_all(&frame(payload)).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
