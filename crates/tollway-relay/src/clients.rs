use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use tollway_config::RelayConfig;

use crate::error::RelayError;

/// Timeout for calls that must answer quickly, like health checks
const IMPATIENT_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Upstream HTTP clients built once at startup
///
/// Clones share their connection pools.
#[derive(Debug, Clone)]
pub struct HttpClients {
    /// Buffered requests, bounded by the whole-request timeout
    pub plain: Client,
    /// Streaming requests; send them with [`HttpClients::send_stream`]
    pub stream: Client,
    /// Short requests that should fail fast
    pub impatient: Client,
    header_timeout: Option<Duration>,
}

impl HttpClients {
    /// Build the clients from relay settings; zero timeouts are unbounded
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised
    pub fn from_config(config: &RelayConfig) -> Result<Self, reqwest::Error> {
        let mut plain = base_builder();
        if !config.relay_timeout.is_zero() {
            plain = plain.timeout(config.relay_timeout);
        }

        Ok(Self {
            plain: plain.build()?,
            stream: base_builder().build()?,
            impatient: base_builder().timeout(IMPATIENT_TIMEOUT).build()?,
            header_timeout: Some(config.stream_relay_timeout).filter(|t| !t.is_zero()),
        })
    }

    /// Send a streaming request, waiting at most `stream_relay_timeout` for
    /// the response headers
    ///
    /// The body itself has no deadline here; the stream relay polices gaps
    /// between upstream lines.
    ///
    /// # Errors
    ///
    /// Returns `do_request_failed` when the request fails or the headers do
    /// not arrive in time
    pub async fn send_stream(&self, request: RequestBuilder) -> Result<Response, RelayError> {
        let send = request.send();

        let response = match self.header_timeout {
            Some(limit) => tokio::time::timeout(limit, send).await.map_err(|e| {
                tracing::warn!(timeout = ?limit, "upstream response headers timed out");
                RelayError::io("do_request_failed", e)
            })?,
            None => send.await,
        };

        response.map_err(|e| RelayError::io("do_request_failed", e))
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_nodelay(true)
        .tcp_keepalive(TCP_KEEPALIVE)
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tollway_core::{HttpError, RelayInfo, RelayMode};

    use super::*;
    use crate::sink::WriterSink;
    use crate::stream::{StreamRelay, upstream_reader};
    use crate::usage::reconcile_stream;

    const EVENT_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";

    /// Serve one connection with a hand-written HTTP/1.1 exchange
    async fn raw_upstream<F, Fut>(script: F) -> String
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0_u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();
            script(socket).await;
        });

        format!("http://{addr}/v1/chat/completions")
    }

    fn relay_config(header_timeout: Duration) -> RelayConfig {
        RelayConfig {
            streaming_timeout: Duration::from_secs(10),
            stream_relay_timeout: header_timeout,
            ..RelayConfig::default()
        }
    }

    #[test]
    fn builds_with_defaults_and_timeouts() {
        let clients = HttpClients::from_config(&RelayConfig::default()).unwrap();
        assert!(clients.header_timeout.is_none());

        let config = RelayConfig {
            relay_timeout: Duration::from_secs(30),
            stream_relay_timeout: Duration::from_secs(15),
            ..RelayConfig::default()
        };
        let clients = HttpClients::from_config(&config).unwrap();
        assert_eq!(clients.header_timeout, Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn body_pause_past_header_timeout_is_relayed_whole() {
        let url = raw_upstream(|mut socket| async move {
            socket.write_all(EVENT_HEAD).await.unwrap();
            socket
                .write_all(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(1500)).await;
            socket
                .write_all(b"data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n\n")
                .await
                .unwrap();
        })
        .await;

        let config = relay_config(Duration::from_millis(500));
        let clients = HttpClients::from_config(&config).unwrap();
        let response = clients.send_stream(clients.stream.post(&url)).await.unwrap();

        let info = RelayInfo::new(RelayMode::ChatCompletions, "gpt-4o", 1);
        let mut sink = WriterSink::new(Vec::new());
        let usage = StreamRelay::from_config(&config)
            .run(upstream_reader(response), &info, &mut sink)
            .await
            .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("\"Hello\""));
        assert!(output.contains("\" world\""));
        assert!(output.ends_with("data: [DONE]\n\n"));
        assert_eq!(usage, reconcile_stream("Hello world", "gpt-4o", 1, 0));
    }

    #[tokio::test]
    async fn slow_headers_fail_the_request() {
        let url = raw_upstream(|mut socket| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = socket.write_all(EVENT_HEAD).await;
        })
        .await;

        let clients = HttpClients::from_config(&relay_config(Duration::from_millis(300))).unwrap();
        let err = clients.send_stream(clients.stream.post(&url)).await.unwrap_err();

        assert_eq!(err.error_code(), Some("do_request_failed"));
    }
}
