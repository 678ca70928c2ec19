use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gatemeter::config::ProviderEndpointConfig;
use gatemeter::providers::ProviderAdapter;
use gatemeter::providers::openai::OpenAiAdapter;
use gatemeter::providers::types::TokenUsage;

use crate::common;

fn adapter(uri: &str, key: Option<&str>) -> OpenAiAdapter {
    OpenAiAdapter::new(&ProviderEndpointConfig {
        api_key: key.map(String::from),
        base_url: Some(format!("{uri}/v1")),
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_openai_chat_contract() {
    let mock_server = MockServer::start().await;

    let response_body = serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "{\"answer\": 4}"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    });

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-3.5-turbo",
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": "You are a helpful assistant.\nResponse Format: JSON"},
                {"role": "user", "content": "2+2?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = adapter(&mock_server.uri(), Some("sk-test"));
    let req = common::request(serde_json::json!({
        "user_id": "u1", "model": "gpt-3.5-turbo", "prompt": "2+2?"
    }));
    let call = provider
        .build_request(&req, &common::normalized(&provider, &req), true)
        .unwrap();

    let raw = provider.send(&call).await.unwrap();
    assert_eq!(raw.status, 200);
    assert_eq!(
        provider.extract_usage(&raw.body),
        Some(TokenUsage { input_tokens: 10, output_tokens: 5 })
    );
    let relayed: serde_json::Value = serde_json::from_slice(&raw.body).unwrap();
    assert_eq!(relayed, response_body);
}

#[tokio::test]
async fn test_openai_error_is_returned_untouched() {
    let mock_server = MockServer::start().await;
    let error_body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string(error_body))
        .mount(&mock_server)
        .await;

    let provider = adapter(&mock_server.uri(), Some("sk-bad"));
    let req = common::request(serde_json::json!({
        "user_id": "u1", "model": "gpt-3.5-turbo", "prompt": "hi"
    }));
    let call = provider
        .build_request(&req, &common::normalized(&provider, &req), false)
        .unwrap();

    let raw = provider.send(&call).await.unwrap();
    assert_eq!(raw.status, 401);
    assert!(!raw.is_success());
    assert_eq!(&raw.body[..], error_body.as_bytes());
}

#[tokio::test]
async fn test_openai_missing_key_makes_no_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let provider = adapter(&mock_server.uri(), None);
    let req = common::request(serde_json::json!({
        "user_id": "u1", "model": "gpt-3.5-turbo", "prompt": "hi"
    }));
    let call = provider
        .build_request(&req, &common::normalized(&provider, &req), true)
        .unwrap();

    let err = provider.send(&call).await.unwrap_err();
    assert_eq!(err.to_string(), "OPENAI_API_KEY is not set");
}
