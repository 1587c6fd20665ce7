//! Integration tests for the HTTP generation backends against mock servers.
//!
//! Covers:
//! - Request shape (path, auth header, body) for every provider
//! - Response extraction on success
//! - Non-2xx status, malformed JSON and empty content as `ProviderCall`
//! - Registry construction from config with env-provided keys
//! - A failing HTTP primary falling over to a healthy HTTP secondary

use std::sync::Mutex;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokio_llm_router::config::RouterConfig;
use tokio_llm_router::{
    AnthropicBackend, BackendRegistry, ContentRouter, GeminiBackend, GenerationBackend,
    GenerationParams, HealthLedger, OpenAiBackend, ProviderId, RouterError, RoutingRequest,
};

/// Serialise tests that read/write environment variables so they don't race
/// against each other within this integration test binary.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

// ============================================================================
// Helpers
// ============================================================================

fn params(model: &str) -> GenerationParams {
    GenerationParams {
        model: model.to_string(),
        system_prompt: "You are a copywriter.".to_string(),
        user_prompt: "Write a tagline".to_string(),
        temperature: 0.9,
        max_tokens: 64,
    }
}

fn chat_body(text: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
}

fn assert_provider_call(result: Result<String, RouterError>, provider: ProviderId, needle: &str) {
    match result {
        Err(RouterError::ProviderCall {
            provider: got,
            message,
        }) => {
            assert_eq!(got, provider);
            assert!(message.contains(needle), "message was: {message}");
        }
        other => std::panic::panic_any(format!("expected ProviderCall, got {other:?}")),
    }
}

// ============================================================================
// OpenAI / Perplexity
// ============================================================================

#[tokio::test]
async fn test_openai_success_extracts_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 64,
            "messages": [
                {"role": "system", "content": "You are a copywriter."},
                {"role": "user", "content": "Write a tagline"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Fresh every day.")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
    let text = backend
        .generate(&params("gpt-4o-mini"))
        .await
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: generate: {e}")));

    assert_eq!(text, "Fresh every day.");
}

#[tokio::test]
async fn test_perplexity_uses_chat_completions_and_reports_own_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer pplx-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Sourced answer")))
        .mount(&server)
        .await;

    let backend = OpenAiBackend::for_provider(ProviderId::Perplexity, "pplx-test")
        .with_base_url(format!("{}/", server.uri()));

    assert_eq!(backend.provider(), ProviderId::Perplexity);
    let text = backend
        .generate(&params("sonar"))
        .await
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: generate: {e}")));
    assert_eq!(text, "Sourced answer");
}

#[tokio::test]
async fn test_openai_http_429_is_provider_call_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
    let result = backend.generate(&params("gpt-4o")).await;

    assert_provider_call(result, ProviderId::OpenAi, "429");
}

#[tokio::test]
async fn test_openai_malformed_json_is_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
    let result = backend.generate(&params("gpt-4o")).await;

    assert_provider_call(result, ProviderId::OpenAi, "failed to parse response");
}

#[tokio::test]
async fn test_openai_empty_choices_is_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
    let result = backend.generate(&params("gpt-4o")).await;

    assert_provider_call(result, ProviderId::OpenAi, "no content");
}

// ============================================================================
// Anthropic
// ============================================================================

#[tokio::test]
async fn test_anthropic_success_joins_text_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", AnthropicBackend::API_VERSION))
        .and(body_partial_json(json!({
            "model": "claude-3-5-haiku-latest",
            "system": "You are a copywriter."
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Bold "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "flavour."}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = AnthropicBackend::new("sk-ant-test").with_base_url(server.uri());
    let text = backend
        .generate(&params("claude-3-5-haiku-latest"))
        .await
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: generate: {e}")));

    assert_eq!(text, "Bold flavour.");
}

#[tokio::test]
async fn test_anthropic_http_529_is_provider_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let backend = AnthropicBackend::new("sk-ant-test").with_base_url(server.uri());
    let result = backend.generate(&params("claude-3-5-sonnet-latest")).await;

    assert_provider_call(result, ProviderId::Anthropic, "overloaded");
}

// ============================================================================
// Gemini
// ============================================================================

#[tokio::test]
async fn test_gemini_success_reads_first_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-test"))
        .and(body_partial_json(json!({
            "generationConfig": {"maxOutputTokens": 64}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Sunny "}, {"text": "savings."}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new("g-test").with_base_url(server.uri());
    let text = backend
        .generate(&params("gemini-1.5-flash"))
        .await
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: generate: {e}")));

    assert_eq!(text, "Sunny savings.");
}

#[tokio::test]
async fn test_gemini_no_candidates_is_provider_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new("g-test").with_base_url(server.uri());
    let result = backend.generate(&params("gemini-1.5-pro")).await;

    assert_provider_call(result, ProviderId::Gemini, "no candidates");
}

// ============================================================================
// Registry from config
// ============================================================================

fn only_openai_and_anthropic(openai_url: &str, anthropic_url: &str) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.providers.gemini.enabled = false;
    config.providers.perplexity.enabled = false;
    config.providers.open_ai.base_url = Some(openai_url.to_string());
    config.providers.open_ai.api_key_env = Some("ROUTER_TEST_OPENAI_KEY".to_string());
    config.providers.anthropic.base_url = Some(anthropic_url.to_string());
    config.providers.anthropic.api_key_env = Some("ROUTER_TEST_ANTHROPIC_KEY".to_string());
    config
}

#[test]
fn test_from_config_missing_key_names_variable() {
    let _guard = ENV_MUTEX
        .lock()
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: env lock: {e}")));
    std::env::remove_var("ROUTER_TEST_OPENAI_KEY");
    std::env::remove_var("ROUTER_TEST_ANTHROPIC_KEY");

    let config = only_openai_and_anthropic("http://localhost:1", "http://localhost:2");
    let err = BackendRegistry::from_config(&config).err();

    match err {
        Some(RouterError::ConfigError(msg)) => assert!(msg.contains("ROUTER_TEST_OPENAI_KEY")),
        other => std::panic::panic_any(format!("expected ConfigError, got {other:?}")),
    }
}

#[tokio::test]
async fn test_router_from_config_fails_over_between_http_backends() {
    let openai = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&openai)
        .await;

    let anthropic = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ant-from-env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Served by the backup."}]
        })))
        .expect(1)
        .mount(&anthropic)
        .await;

    let config = only_openai_and_anthropic(&openai.uri(), &anthropic.uri());
    let router = {
        let _guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: env lock: {e}")));
        std::env::set_var("ROUTER_TEST_OPENAI_KEY", "oa-from-env");
        std::env::set_var("ROUTER_TEST_ANTHROPIC_KEY", "ant-from-env");
        let router = ContentRouter::from_config(config);
        std::env::remove_var("ROUTER_TEST_OPENAI_KEY");
        std::env::remove_var("ROUTER_TEST_ANTHROPIC_KEY");
        router.unwrap_or_else(|e| std::panic::panic_any(format!("test: from_config: {e}")))
    };

    let outcome = router
        .handle(&RoutingRequest::new("Write a tagline for our bakery"))
        .await
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: handle: {e}")));

    assert_eq!(outcome.provider, ProviderId::Anthropic);
    assert_eq!(outcome.text, "Served by the backup.");
    assert!(outcome.fallback_used);
    let failure = router.ledger().state(ProviderId::OpenAi);
    assert_eq!(failure.consecutive_failures, 1);
    assert!(failure
        .last_error
        .map(|e| e.message.contains("503"))
        .unwrap_or(false));
}
