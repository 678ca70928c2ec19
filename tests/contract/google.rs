use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gatemeter::config::ProviderEndpointConfig;
use gatemeter::providers::ProviderAdapter;
use gatemeter::providers::google::GoogleAdapter;
use gatemeter::providers::types::TokenUsage;

use crate::common;

#[tokio::test]
async fn test_google_generate_content_contract() {
    let mock_server = MockServer::start().await;

    let response_body = serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": "Hello from Gemini"}], "role": "model"},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {
            "promptTokenCount": 7,
            "candidatesTokenCount": 3,
            "totalTokenCount": 10
        }
    });

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-test"))
        .and(body_partial_json(serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Hello"}]},
                {"role": "model", "parts": [{"text": "Hi!"}]},
                {"role": "user", "parts": [{"text": "How are you?"}]}
            ],
            "generationConfig": {"response_mime_type": "application/json"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = GoogleAdapter::new(&ProviderEndpointConfig {
        api_key: Some("g-test".into()),
        base_url: Some(format!("{}/v1beta", mock_server.uri())),
        timeout_secs: 5,
    })
    .unwrap();

    let req = common::request(serde_json::json!({
        "user_id": "u1",
        "model": "gemini-1.5-flash",
        "messages": [
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "content": "Hi!"},
            {"role": "user", "content": "How are you?"}
        ]
    }));
    let call = provider
        .build_request(&req, &common::normalized(&provider, &req), true)
        .unwrap();

    let raw = provider.send(&call).await.unwrap();
    assert!(raw.is_success());
    assert_eq!(
        provider.extract_usage(&raw.body),
        Some(TokenUsage { input_tokens: 7, output_tokens: 3 })
    );
}

#[tokio::test]
async fn test_google_safety_block_without_usage() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&mock_server)
        .await;

    let provider = GoogleAdapter::new(&ProviderEndpointConfig {
        api_key: Some("g-test".into()),
        base_url: Some(format!("{}/v1beta", mock_server.uri())),
        timeout_secs: 5,
    })
    .unwrap();

    let req = common::request(serde_json::json!({
        "user_id": "u1", "model": "gemini-1.5-flash", "prompt": "hi"
    }));
    let call = provider
        .build_request(&req, &common::normalized(&provider, &req), false)
        .unwrap();

    let raw = provider.send(&call).await.unwrap();
    assert!(raw.is_success());
    assert_eq!(provider.extract_usage(&raw.body), None);
}
