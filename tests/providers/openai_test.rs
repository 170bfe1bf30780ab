use std::time::Duration;

use futures::StreamExt;
use pixel_agent::core::{normalize, ConnectionOptions, ErrorCode};
use pixel_agent::providers::{ChatMessage, ChatRequest, LLMProvider, OpenAIProvider, StreamChunk};
use pixel_agent::tools::{ToolCall, ToolDefinition};
use pixel_agent::LLMError;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(payloads: &[Value]) -> String {
    let mut body: String = payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_raw(body, "text/event-stream")
}

fn text_delta(content: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]})
}

async fn provider_for(server: &MockServer) -> OpenAIProvider {
    let mut provider = OpenAIProvider::new();
    provider
        .initialize(
            &ConnectionOptions::new("sk-test").with_base_url(format!("{}/v1", server.uri())),
        )
        .unwrap();
    provider
}

async fn mount_chat(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("accept", "text/event-stream"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn collect(provider: &OpenAIProvider, request: ChatRequest) -> Vec<Result<StreamChunk, LLMError>> {
    provider.stream_response(request).unwrap().collect().await
}

fn hello_request() -> ChatRequest {
    ChatRequest::new(
        "gpt-4.1-mini",
        vec![ChatMessage::system("Be brief."), ChatMessage::user("Hello")],
    )
}

#[tokio::test]
async fn test_streams_text_chunks_in_order() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        sse_response(sse(&[
            json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
            text_delta("Hel"),
            text_delta("lo!"),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
        ])),
    )
    .await;
    let provider = provider_for(&server).await;

    let chunks: Vec<StreamChunk> = collect(&provider, hello_request())
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(chunks, vec![StreamChunk::text("Hel"), StreamChunk::text("lo!")]);
}

#[tokio::test]
async fn test_request_body_is_openai_shaped() {
    let server = MockServer::start().await;
    mount_chat(&server, sse_response(sse(&[text_delta("ok")]))).await;
    let provider = provider_for(&server).await;

    let request = ChatRequest::new(
        "gpt-4.1-mini",
        vec![
            ChatMessage::user("Weather in Tokyo?"),
            ChatMessage::tool("sunny", "call_1", Some("weather".to_string())),
        ],
    )
    .with_tools(vec![ToolDefinition::function(
        "weather",
        Some("Current weather".to_string()),
        Some(json!({"type": "object"})),
    )]);
    let _ = collect(&provider, request).await;

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: Value = received[0].body_json().unwrap();
    assert_eq!(body["model"], "gpt-4.1-mini");
    assert_eq!(body["stream"], true);
    assert_eq!(
        body["messages"][1],
        json!({"role": "tool", "content": "sunny", "tool_call_id": "call_1", "name": "weather"})
    );
    assert_eq!(body["tools"][0]["type"], "function");
    assert_eq!(body["tools"][0]["function"]["name"], "weather");
}

#[tokio::test]
async fn test_tool_call_assembled_from_fragments() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        sse_response(sse(&[
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                 "function": {"name": "weather", "arguments": "{\"city\": "}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"Tokyo\"}"}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        ])),
    )
    .await;
    let provider = provider_for(&server).await;

    let chunks = collect(&provider, hello_request()).await;
    assert_eq!(chunks.len(), 1);
    let Ok(StreamChunk::ToolCall(call)) = &chunks[0] else {
        panic!("expected a tool call, got {chunks:?}");
    };
    assert_eq!(
        call,
        &ToolCall::function("call_1", "weather", r#"{"city": "Tokyo"}"#)
    );
    assert_eq!(call.parsed_arguments().unwrap(), json!({"city": "Tokyo"}));
}

#[tokio::test]
async fn test_unauthorized_status_normalizes() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })),
    )
    .await;
    let provider = provider_for(&server).await;

    let chunks = collect(&provider, hello_request()).await;
    let [Err(error)] = chunks.as_slice() else {
        panic!("expected a single error, got {chunks:?}");
    };
    let normalized = normalize(error);
    assert_eq!(normalized.code, ErrorCode::Unauthorized);
    assert_eq!(normalized.status, Some(401));
    assert!(normalized.message.contains("API key"));
    assert_eq!(
        normalized.raw_message.as_deref(),
        Some("Incorrect API key provided")
    );
}

#[tokio::test]
async fn test_server_error_and_bad_request_statuses() {
    for (status, expected) in [(503, ErrorCode::ServerError), (400, ErrorCode::InvalidRequest)] {
        let server = MockServer::start().await;
        mount_chat(&server, ResponseTemplate::new(status).set_body_string("nope")).await;
        let provider = provider_for(&server).await;

        let chunks = collect(&provider, hello_request()).await;
        let error = chunks[0].as_ref().unwrap_err();
        assert_eq!(normalize(error).code, expected, "status {status}");
    }
}

#[tokio::test]
async fn test_error_payload_mid_stream() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        sse_response(sse(&[
            text_delta("Partial"),
            json!({"error": {"message": "Rate limit exceeded", "code": 429}}),
            text_delta("never seen"),
        ])),
    )
    .await;
    let provider = provider_for(&server).await;

    let chunks = collect(&provider, hello_request()).await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].as_ref().unwrap(), &StreamChunk::text("Partial"));
    let normalized = normalize(chunks[1].as_ref().unwrap_err());
    assert_eq!(normalized.code, ErrorCode::RateLimit);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_response() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        sse_response(sse(&[text_delta("too late")])).set_delay(Duration::from_secs(5)),
    )
    .await;
    let provider = provider_for(&server).await;

    let cancel = CancellationToken::new();
    let stream = provider
        .stream_response(hello_request().with_cancellation(cancel.clone()))
        .unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let chunks: Vec<_> = tokio::time::timeout(Duration::from_secs(2), stream.collect())
        .await
        .expect("cancellation should end the stream promptly");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].as_ref().unwrap_err().is_aborted());
    assert_eq!(normalize(chunks[0].as_ref().unwrap_err()).code, ErrorCode::Aborted);
}

#[tokio::test]
async fn test_no_request_until_polled() {
    let server = MockServer::start().await;
    mount_chat(&server, sse_response(sse(&[text_delta("hi")]))).await;
    let provider = provider_for(&server).await;

    let stream = provider.stream_response(hello_request()).unwrap();
    drop(stream);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_check_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "gpt-4.1-mini", "object": "model", "owned_by": "openai"}]
        })))
        .mount(&server)
        .await;
    let provider = provider_for(&server).await;

    assert!(provider.check_connection().await);
    let models = provider.list_models().await.unwrap();
    assert_eq!(models[0].id, "gpt-4.1-mini");
    assert_eq!(models[0].owned_by.as_deref(), Some("openai"));
}

#[tokio::test]
async fn test_check_connection_reports_failure_as_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let provider = provider_for(&server).await;

    assert!(!provider.check_connection().await);
    let error = provider.verify_connection().await.unwrap_err();
    assert_eq!(normalize(&error).code, ErrorCode::ServerError);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    // bind then release a port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut provider = OpenAIProvider::new();
    provider
        .initialize(&ConnectionOptions::new("sk-test").with_base_url(format!("http://127.0.0.1:{port}/v1")))
        .unwrap();

    assert!(!provider.check_connection().await);
    let chunks = collect(&provider, hello_request()).await;
    assert_eq!(normalize(chunks[0].as_ref().unwrap_err()).code, ErrorCode::NetworkError);
}
