//! Mock upstream provider backed by wiremock

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CHAT_PATH: &str = "/v1/chat/completions";

/// Upstream provider serving one canned response
pub struct MockUpstream {
    server: MockServer,
}

impl MockUpstream {
    /// Serve `frames` as an event stream terminated by `[DONE]`
    pub async fn streaming(frames: &[String]) -> Self {
        let mut body = String::new();
        for frame in frames {
            body.push_str("data: ");
            body.push_str(frame);
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");

        Self::respond(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .await
    }

    /// Serve a buffered JSON body verbatim
    pub async fn buffered(status: u16, body: &str) -> Self {
        Self::respond(
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
        .await
    }

    async fn respond(template: ResponseTemplate) -> Self {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .respond_with(template)
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn url(&self) -> String {
        format!("{}{CHAT_PATH}", self.server.uri())
    }
}

/// Chat streaming chunk carrying a content delta
pub fn content_frame(text: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-it",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": text}}]
    })
    .to_string()
}

/// Terminal chunk with upstream-reported usage
pub fn usage_frame(prompt: u32, completion: u32) -> String {
    serde_json::json!({
        "id": "chatcmpl-it",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [],
        "usage": {
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": prompt + completion
        }
    })
    .to_string()
}
