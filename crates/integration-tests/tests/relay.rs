mod harness;

use harness::gateway::TestGateway;
use harness::parse_sse_data;
use harness::upstream::{MockUpstream, content_frame, usage_frame};
use tollway_core::Usage;

fn chat_body(model: &str, stream: bool, include_usage: bool) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": stream,
        "stream_options": {"include_usage": include_usage}
    })
}

async fn post(gateway: &TestGateway, body: &serde_json::Value) -> reqwest::Response {
    gateway
        .client()
        .post(gateway.url("/v1/chat/completions"))
        .json(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn streaming_relay_sets_event_stream_headers() {
    let upstream = MockUpstream::streaming(&[content_frame("Hi")]).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let resp = post(&gateway, &chat_body("gpt-4o", true, false)).await;

    assert_eq!(resp.status(), 200);
    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    };
    assert_eq!(header("content-type"), "text/event-stream");
    assert_eq!(header("cache-control"), "no-cache");
    assert_eq!(header("x-accel-buffering"), "no");
}

#[tokio::test]
async fn streaming_relay_hides_usage_frame_unless_requested() {
    let frames = vec![content_frame("Hel"), content_frame("lo"), usage_frame(8, 2)];
    let upstream = MockUpstream::streaming(&frames).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let text = post(&gateway, &chat_body("gpt-4o", true, false)).await.text().await.unwrap();

    assert_eq!(parse_sse_data(&text), vec![frames[0].clone(), frames[1].clone(), "[DONE]".to_owned()]);
    assert_eq!(gateway.next_billed().await.unwrap(), Usage::new(8, 2));
}

#[tokio::test]
async fn streaming_relay_forwards_usage_frame_when_requested() {
    let frames = vec![content_frame("Hello"), usage_frame(8, 1)];
    let upstream = MockUpstream::streaming(&frames).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let text = post(&gateway, &chat_body("gpt-4o", true, true)).await.text().await.unwrap();

    let events = parse_sse_data(&text);
    assert_eq!(&events[..2], &frames[..]);
    assert_eq!(events[2], "[DONE]");
    assert_eq!(gateway.next_billed().await.unwrap(), Usage::new(8, 1));
}

#[tokio::test]
async fn streaming_relay_counts_usage_the_upstream_omitted() {
    let frames = vec![content_frame("Hello"), content_frame(" world")];
    let upstream = MockUpstream::streaming(&frames).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let text = post(&gateway, &chat_body("gpt-4o", true, true)).await.text().await.unwrap();

    let events = parse_sse_data(&text);
    assert_eq!(events.len(), 4);
    assert_eq!(events[3], "[DONE]");

    let final_chunk: serde_json::Value = serde_json::from_str(&events[2]).unwrap();
    assert_eq!(final_chunk["id"], "chatcmpl-it");
    assert_eq!(final_chunk["choices"], serde_json::json!([]));

    let billed = gateway.next_billed().await.unwrap();
    assert!(billed.prompt_tokens > 0);
    assert!(billed.completion_tokens > 0);
    assert_eq!(billed.total_tokens, billed.prompt_tokens + billed.completion_tokens);
    assert_eq!(final_chunk["usage"]["total_tokens"], billed.total_tokens);
}

#[tokio::test]
async fn buffered_relay_strips_filter_results_for_o1() {
    let body = r#"{"id":"chatcmpl-b","prompt_filter_results":[{"prompt_index":0}],"choices":[{"index":0,"content_filter_results":{},"message":{"role":"assistant","content":"hey"}}],"usage":{"prompt_tokens":4,"completion_tokens":1,"total_tokens":5}}"#;
    let upstream = MockUpstream::buffered(200, body).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let resp = post(&gateway, &chat_body("o1-mini", false, false)).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"id":"chatcmpl-b","choices":[{"index":0,"message":{"role":"assistant","content":"hey"}}],"usage":{"prompt_tokens":4,"completion_tokens":1,"total_tokens":5}}"#
    );
    assert_eq!(gateway.next_billed().await.unwrap(), Usage::new(4, 1));
}

#[tokio::test]
async fn buffered_relay_passes_other_models_through_byte_for_byte() {
    let body = r#"{ "id" : "chatcmpl-c", "choices": [{"message": {"content": "yo"}}], "usage": {"prompt_tokens": 2, "completion_tokens": 1, "total_tokens": 3} }"#;
    let upstream = MockUpstream::buffered(200, body).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let resp = post(&gateway, &chat_body("gpt-4o-mini", false, false)).await;

    assert_eq!(resp.text().await.unwrap(), body);
}

#[tokio::test]
async fn buffered_relay_rejects_empty_completions() {
    let body = r#"{"choices":[{"message":{"content":""}}],"usage":{"prompt_tokens":0,"completion_tokens":0,"total_tokens":0}}"#;
    let upstream = MockUpstream::buffered(200, body).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let resp = post(&gateway, &chat_body("gpt-4o", false, false)).await;

    assert_eq!(resp.status(), 429);
    let error: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(error["error"]["type"], "rate_limit_exceeded");
    assert!(gateway.next_billed().await.is_err());
}

#[tokio::test]
async fn buffered_relay_propagates_declared_upstream_errors() {
    let body = r#"{"error":{"message":"The model does not exist","type":"invalid_request_error","param":null,"code":"model_not_found"}}"#;
    let upstream = MockUpstream::buffered(404, body).await;
    let gateway = TestGateway::start(upstream.url()).await.unwrap();

    let resp = post(&gateway, &chat_body("gpt-9", false, false)).await;

    assert_eq!(resp.status(), 404);
    let error: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(error["error"]["message"], "The model does not exist");
    assert_eq!(error["error"]["code"], "model_not_found");
}
