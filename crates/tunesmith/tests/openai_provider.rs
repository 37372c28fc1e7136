//! `OpenAiProvider` against a mock chat-completions endpoint.

use serde_json::{json, Value};
use tuneconf::LlmConfig;
use tunesmith::{ChatModel, ChatRequest, LlmError, OpenAiProvider, Sampling};
use wiremock::matchers::{bearer_token, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: Value) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
            "logprobs": null
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

fn provider(server: &MockServer) -> OpenAiProvider {
    let config = LlmConfig {
        api_base: server.uri(),
        api_key: Some("sk-test".to_string()),
        model: "gpt-4o-mini".to_string(),
        timeout_secs: 5,
        ..Default::default()
    };
    OpenAiProvider::new(&config).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest {
        system: "You are a composer.".to_string(),
        user: "a sea shanty".to_string(),
        sampling: Sampling::notation(1000),
    }
}

#[tokio::test]
async fn sends_messages_and_sampling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(bearer_token("sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 1000,
            "messages": [
                {"role": "system", "content": "You are a composer."},
                {"role": "user", "content": "a sea shanty"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("  X:1\nK:C\nCDEF|\n  "))))
        .expect(1)
        .mount(&server)
        .await;

    let reply = provider(&server).complete(&request()).await.unwrap();
    assert_eq!(reply, "X:1\nK:C\nCDEF|");
}

#[tokio::test]
async fn blank_content_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!("   "))))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request()).await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse), "got {err:?}");
}

#[tokio::test]
async fn null_content_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(Value::Null)))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request()).await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse), "got {err:?}");
}

#[tokio::test]
async fn malformed_body_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = provider(&server).complete(&request()).await.unwrap_err();
    assert!(matches!(err, LlmError::Api(_)), "got {err:?}");
}
