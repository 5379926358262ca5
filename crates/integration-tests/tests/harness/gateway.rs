//! Minimal gateway that relays to a mock upstream through the relay engine

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tollway_config::Config;
use tollway_core::{RelayInfo, RelayMode, Usage};
use tollway_relay::tokenizer::count_text_tokens;
use tollway_relay::{HttpClients, RelayError, relay_buffered, sse_response, upstream_reader};

struct GatewayState {
    config: Config,
    clients: HttpClients,
    upstream_url: String,
    billed: mpsc::UnboundedSender<Result<Usage, String>>,
}

/// A running gateway bound to a random port
pub struct TestGateway {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    billed: Mutex<mpsc::UnboundedReceiver<Result<Usage, String>>>,
}

impl TestGateway {
    pub async fn start(upstream_url: String) -> anyhow::Result<Self> {
        let config = Config::default();
        let clients = HttpClients::from_config(&config.relay)?;
        let (billed_tx, billed_rx) = mpsc::unbounded_channel();

        let state = Arc::new(GatewayState {
            config,
            clients,
            upstream_url,
            billed: billed_tx,
        });

        let router = Router::new()
            .route("/v1/chat/completions", routing::post(chat_completions))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            billed: Mutex::new(billed_rx),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Usage recorded for the next finished relay
    pub async fn next_billed(&self) -> Result<Usage, String> {
        let mut rx = self.billed.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("relay never reported usage")
            .expect("gateway dropped its ledger")
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn prompt_tokens(request: &Value, model: &str) -> u32 {
    request["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|message| message["content"].as_str())
        .map(|content| count_text_tokens(content, model))
        .sum()
}

async fn chat_completions(State(state): State<Arc<GatewayState>>, Json(request): Json<Value>) -> Response {
    let model = request["model"].as_str().unwrap_or_default().to_owned();
    let stream = request["stream"].as_bool().unwrap_or(false);
    let include_usage = request["stream_options"]["include_usage"].as_bool().unwrap_or(false);

    let info = RelayInfo::new(RelayMode::ChatCompletions, &model, prompt_tokens(&request, &model))
        .with_include_usage(include_usage);

    let sent = if stream {
        let upstream = state.clients.stream.post(&state.upstream_url).json(&request);
        state.clients.send_stream(upstream).await
    } else {
        let upstream = state.clients.plain.post(&state.upstream_url).json(&request);
        upstream.send().await.map_err(|e| RelayError::io("do_request_failed", e))
    };
    let upstream = match sent {
        Ok(upstream) => upstream,
        Err(e) => return e.into_response(),
    };

    if stream {
        let (response, handle) = sse_response(upstream_reader(upstream), info, &state.config.relay);
        let billed = state.billed.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            let _ = billed.send(outcome);
        });
        return response;
    }

    match relay_buffered(upstream, &info).await {
        Ok(relayed) => {
            let _ = state.billed.send(Ok(relayed.usage));
            relayed.response
        }
        Err(e) => {
            let _ = state.billed.send(Err(e.to_string()));
            e.into_response()
        }
    }
}
