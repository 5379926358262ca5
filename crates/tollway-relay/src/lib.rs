//! Upstream response relay for the Tollway gateway
//!
//! Streams upstream server-sent events to the caller with one frame of
//! lookahead, relays buffered responses with order-preserving patches, and
//! reconciles the token usage billed for every request.

#![allow(clippy::must_use_candidate)]

pub mod aggregate;
mod clients;
mod error;
mod frame;
pub mod handler;
pub mod patch;
pub mod protocol;
pub mod sink;
pub mod stream;
pub mod tokenizer;
pub mod transcript;
pub mod usage;

pub use clients::HttpClients;
pub use error::RelayError;
pub use handler::{BufferedRelay, relay_buffered, relay_speech, relay_transcription};
pub use sink::{ChannelSink, EventSink, SinkError, WriterSink};
pub use stream::{StreamRelay, sse_response, upstream_reader};
