use axum::http::StatusCode;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gatemeter::config::ExistencePolicy;
use gatemeter::providers::types::TokenUsage;
use gatemeter::providers::{PricingCatalog, Provider};

use crate::common::{self, app, call, call_json};

fn openai_reply(input: u64, output: u64) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "{}"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": input, "completion_tokens": output, "total_tokens": input + output}
    })
}

#[tokio::test]
async fn test_openai_call_is_relayed_and_billed() {
    let mock_server = MockServer::start().await;
    let reply = openai_reply(10, 5);
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&reply))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Strict);
    state.ledger.create_user("u1").await.unwrap();

    let (status, body) = call(
        app(&state),
        "POST",
        "/openai",
        Some(serde_json::json!({"id_user": "u1", "model": "gpt-3.5-turbo", "prompt": "2+2?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<serde_json::Value>(&body).unwrap(), reply);

    let (status, ledger) = call_json(app(&state), "GET", "/users/u1/ledger", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["total_input_cost"], 0.000005);
    assert_eq!(ledger["total_output_cost"], 0.0000075);
    let model = &ledger["providers"]["openai"]["models"]["gpt-3.5-turbo"];
    assert_eq!(model["input_tokens"], 10);
    assert_eq!(model["output_tokens"], 5);
    assert_eq!(ledger["history"][0]["provider"], "openai");
    assert_eq!(ledger["history"][0]["model"], "gpt-3.5-turbo");
}

#[tokio::test]
async fn test_google_call_through_unified_route() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/google/v1beta/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}], "role": "model"}}],
            "usageMetadata": {"promptTokenCount": 100, "candidatesTokenCount": 50}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Upsert);
    let (status, _) = call(
        app(&state),
        "POST",
        "/v1/chat",
        Some(serde_json::json!({
            "user_id": "fresh", "provider": "google", "model": "gemini-1.5-flash", "prompt": "hi"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let ledger = state.ledger.load_for_display("fresh").await.unwrap();
    assert_eq!(ledger.total_input_cost, 0.0000075);
    assert_eq!(ledger.total_output_cost, 0.000015);
    assert_eq!(ledger.providers["google"].models["gemini-1.5-flash"].input_tokens, 100);
}

#[tokio::test]
async fn test_anthropic_call_is_billed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/anthropic/v1/messages"))
        .and(header("x-api-key", "a-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"type": "text", "text": "hi"}],
            "usage": {"input_tokens": 4, "output_tokens": 8}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Upsert);
    let (status, _) = call(
        app(&state),
        "POST",
        "/anthropic",
        Some(serde_json::json!({
            "user_id": "u1", "model": "claude-3-haiku", "prompt": "hi", "max_tokens": 16
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let ledger = state.ledger.load("u1").await.unwrap();
    let usage = &ledger.providers["anthropic"].models["claude-3-haiku"];
    assert_eq!((usage.input_tokens, usage.output_tokens), (4, 8));
    assert_eq!(ledger.history.len(), 1);
}

#[tokio::test]
async fn test_provider_error_is_relayed_without_billing() {
    let mock_server = MockServer::start().await;
    let error_body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string(error_body))
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Strict);
    state.ledger.create_user("u1").await.unwrap();

    let (status, body) = call(
        app(&state),
        "POST",
        "/openai",
        Some(serde_json::json!({"user_id": "u1", "model": "gpt-3.5-turbo", "prompt": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, error_body.as_bytes());

    let ledger = state.ledger.load("u1").await.unwrap();
    assert!(ledger.history.is_empty());
    assert_eq!(ledger.total_input_cost, 0.0);
}

#[tokio::test]
async fn test_reply_without_usage_is_relayed_without_billing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Upsert);
    let (status, body) = call_json(
        app(&state),
        "POST",
        "/openai",
        Some(serde_json::json!({"user_id": "u1", "model": "gpt-3.5-turbo", "prompt": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"choices": []}));
    assert!(!state.ledger.user_exists("u1").await.unwrap());
}

#[tokio::test]
async fn test_unknown_user_is_rejected_before_provider_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(1, 1)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Strict);
    let (status, body) = call_json(
        app(&state),
        "POST",
        "/openai",
        Some(serde_json::json!({"user_id": "ghost", "model": "gpt-3.5-turbo", "prompt": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User ghost not found");
}

#[tokio::test]
async fn test_unpriced_model_is_rejected_before_provider_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(1, 1)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = common::state(&mock_server.uri(), ExistencePolicy::Upsert);
    let (status, body) = call_json(
        app(&state),
        "POST",
        "/openai",
        Some(serde_json::json!({"user_id": "u1", "model": "gpt-unknown", "prompt": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("gpt-unknown"));
}

#[tokio::test]
async fn test_unreachable_provider_is_500() {
    // Nothing listens on the port once the listener is dropped.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let state = common::state(&uri, ExistencePolicy::Upsert);
    let (status, body) = call_json(
        app(&state),
        "POST",
        "/openai",
        Some(serde_json::json!({"user_id": "u1", "model": "gpt-3.5-turbo", "prompt": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("Error sending request"));
    assert!(!state.ledger.user_exists("u1").await.unwrap());
}

/// Provider reply carrying `input`/`output` tokens in that provider's shape.
fn usage_reply(provider: Provider, input: u64, output: u64) -> serde_json::Value {
    match provider {
        Provider::OpenAi => openai_reply(input, output),
        Provider::Google => serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}], "role": "model"}}],
            "usageMetadata": {"promptTokenCount": input, "candidatesTokenCount": output}
        }),
        Provider::Anthropic => serde_json::json!({
            "content": [{"type": "text", "text": "ok"}],
            "usage": {"input_tokens": input, "output_tokens": output}
        }),
    }
}

fn provider_path(provider: Provider, model: &str) -> String {
    match provider {
        Provider::OpenAi => "/openai/v1/chat/completions".to_string(),
        Provider::Google => format!("/google/v1beta/models/{model}:generateContent"),
        Provider::Anthropic => "/anthropic/v1/messages".to_string(),
    }
}

#[tokio::test]
async fn test_concurrent_calls_are_all_billed() {
    const MODELS: [(Provider, &str); 6] = [
        (Provider::OpenAi, "gpt-3.5-turbo"),
        (Provider::OpenAi, "gpt-4.1"),
        (Provider::Google, "gemini-1.5-flash"),
        (Provider::Google, "gemini-2.0-pro"),
        (Provider::Anthropic, "claude-3-haiku"),
        (Provider::Anthropic, "claude-3.5-sonnet"),
    ];
    const N: u64 = 18;

    let mock_server = MockServer::start().await;
    let pricing = PricingCatalog::from_json(common::PRICES).unwrap();

    // One distinct (provider, model, tokens) tuple per call, told apart by prompt.
    let calls: Vec<_> = (0..N)
        .map(|i| {
            let (provider, model) = MODELS[(i % MODELS.len() as u64) as usize];
            (i, provider, model, TokenUsage { input_tokens: 10 + i, output_tokens: 5 + 2 * i })
        })
        .collect();

    let (mut want_input, mut want_output) = (0.0, 0.0);
    for &(i, provider, model, usage) in &calls {
        Mock::given(method("POST"))
            .and(path(provider_path(provider, model)))
            .and(body_string_contains(format!("call-{i}!")))
            .respond_with(ResponseTemplate::new(200).set_body_json(usage_reply(
                provider,
                usage.input_tokens,
                usage.output_tokens,
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (input_cost, output_cost) = pricing.lookup(provider, model).unwrap().cost(usage);
        want_input += input_cost;
        want_output += output_cost;
    }

    let state = common::state(&mock_server.uri(), ExistencePolicy::Strict);
    state.ledger.create_user("u1").await.unwrap();

    let requests = calls.iter().map(|&(i, provider, model, _)| {
        call(
            app(&state),
            "POST",
            "/v1/chat",
            Some(serde_json::json!({
                "user_id": "u1",
                "provider": provider,
                "model": model,
                "prompt": format!("call-{i}!"),
                "max_tokens": 32
            })),
        )
    });
    for (status, _) in futures::future::join_all(requests).await {
        assert_eq!(status, StatusCode::OK);
    }

    let ledger = state.ledger.load("u1").await.unwrap();
    assert_eq!(ledger.history.len(), N as usize);
    assert_eq!(ledger.providers.len(), 3);
    for (provider, model) in MODELS {
        let want: u64 = calls
            .iter()
            .filter(|c| c.1 == provider && c.2 == model)
            .map(|c| c.3.input_tokens)
            .sum();
        assert_eq!(ledger.providers[provider.as_str()].models[model].input_tokens, want, "{model}");
    }

    assert!((ledger.total_input_cost - want_input).abs() < 1e-12);
    assert!((ledger.total_output_cost - want_output).abs() < 1e-12);
    let provider_input: f64 = ledger.providers.values().map(|p| p.input_cost).sum();
    let provider_output: f64 = ledger.providers.values().map(|p| p.output_cost).sum();
    assert!((ledger.total_input_cost - provider_input).abs() < 1e-12);
    assert!((ledger.total_output_cost - provider_output).abs() < 1e-12);
}
