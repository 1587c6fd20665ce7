//! Generation backend abstraction and implementations
//!
//! Provides the [`GenerationBackend`] trait and HTTP implementations:
//! - [`OpenAiBackend`]: OpenAI chat completions (also serves Perplexity's
//!   OpenAI-compatible API)
//! - [`AnthropicBackend`]: Anthropic messages API
//! - [`GeminiBackend`]: Google Gemini `generateContent`
//! - [`EchoBackend`]: testing/demo backend, no network
//!
//! ## Environment Variables
//!
//! - `OPENAI_API_KEY`: OpenAI
//! - `ANTHROPIC_API_KEY`: Anthropic
//! - `GEMINI_API_KEY`: Gemini
//! - `PERPLEXITY_API_KEY`: Perplexity
//!
//! Variable names can be changed per provider with
//! `providers.<id>.api_key_env`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::{ProviderId, RouterError};

/// Inputs for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Provider-specific model name.
    pub model: String,
    /// System prompt; empty means none.
    pub system_prompt: String,
    /// Fully assembled user prompt.
    pub user_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// Trait for text-generation backends.
///
/// Implementations must be thread-safe (Send + Sync): the execution loop
/// moves an `Arc<dyn GenerationBackend>` into a spawned task per call.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider this backend talks to.
    fn provider(&self) -> ProviderId;

    /// Generate one completion.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ProviderCall`] on transport failures,
    /// non-success status codes, or malformed responses.
    async fn generate(&self, params: &GenerationParams) -> Result<String, RouterError>;
}

fn call_error(provider: ProviderId, message: impl Into<String>) -> RouterError {
    RouterError::ProviderCall {
        provider,
        message: message.into(),
    }
}

/// Read the API key for `provider` from the environment variable configured
/// for it.
///
/// # Errors
///
/// Returns [`RouterError::ConfigError`] if the variable is unset or empty.
pub fn api_key_from_env(var: &str) -> Result<String, RouterError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RouterError::ConfigError(format!(
            "{var} environment variable not set"
        ))),
    }
}

async fn post_json<B: Serialize + ?Sized>(
    provider: ProviderId,
    request: reqwest::RequestBuilder,
    body: &B,
) -> Result<reqwest::Response, RouterError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| call_error(provider, format!("request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(call_error(
            provider,
            format!("API error {status}: {error_text}"),
        ));
    }

    Ok(response)
}

async fn parse_json<T: for<'de> Deserialize<'de>>(
    provider: ProviderId,
    response: reqwest::Response,
) -> Result<T, RouterError> {
    response
        .json()
        .await
        .map_err(|e| call_error(provider, format!("failed to parse response: {e}")))
}

// ============================================================================
// Echo Backend (Testing)
// ============================================================================

/// Echo backend for demos and smoke tests.
///
/// Returns the user prompt prefixed with the provider and model, after an
/// optional simulated delay.
pub struct EchoBackend {
    provider: ProviderId,
    /// Simulated generation delay
    pub delay_ms: u64,
}

impl EchoBackend {
    /// Echo backend registered under `provider`.
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            delay_ms: 10,
        }
    }

    /// Set the simulated delay.
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl GenerationBackend for EchoBackend {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn generate(&self, params: &GenerationParams) -> Result<String, RouterError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(format!(
            "[{}/{}] {}",
            self.provider, params.model, params.user_prompt
        ))
    }
}

// ============================================================================
// OpenAI-compatible Backend
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat completions request payload
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// Chat completions response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions backend.
///
/// Perplexity exposes the same API, so the same type serves both; use
/// [`OpenAiBackend::for_provider`] with [`ProviderId::Perplexity`].
///
/// ## Example
///
/// ```no_run
/// use tokio_llm_router::{OpenAiBackend, ProviderId};
/// use std::sync::Arc;
///
/// let backend = Arc::new(
///     OpenAiBackend::for_provider(ProviderId::Perplexity, "pplx-key")
///         .with_base_url("https://api.perplexity.ai"),
/// );
/// ```
pub struct OpenAiBackend {
    provider: ProviderId,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    /// OpenAI backend with an explicit key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::for_provider(ProviderId::OpenAi, api_key)
    }

    /// OpenAI-compatible backend registered under `provider`, pointing at
    /// that provider's default base URL.
    pub fn for_provider(provider: ProviderId, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: provider.default_base_url().to_string(),
        }
    }

    /// OpenAI backend reading `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConfigError`] if the key is not set.
    pub fn from_env() -> Result<Self, RouterError> {
        Ok(Self::new(api_key_from_env(
            ProviderId::OpenAi.default_api_key_env(),
        )?))
    }

    /// Override the API base URL (no trailing slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn generate(&self, params: &GenerationParams) -> Result<String, RouterError> {
        let mut messages = Vec::with_capacity(2);
        if !params.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &params.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &params.user_prompt,
        });

        let request = ChatRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        let response = post_json(self.provider, builder, &request).await?;
        let api_response: ChatResponse = parse_json(self.provider, response).await?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| call_error(self.provider, "no content in response"))
    }
}

// ============================================================================
// Anthropic Backend
// ============================================================================

/// Messages API request payload
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

/// Messages API response
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic Claude messages backend.
///
/// ## Example
///
/// ```no_run
/// use tokio_llm_router::AnthropicBackend;
/// use std::sync::Arc;
///
/// let backend = Arc::new(AnthropicBackend::new("sk-ant-..."));
/// ```
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicBackend {
    /// API version header sent with every request.
    pub const API_VERSION: &'static str = "2023-06-01";

    /// Anthropic backend with an explicit key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: ProviderId::Anthropic.default_base_url().to_string(),
        }
    }

    /// Anthropic backend reading `ANTHROPIC_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConfigError`] if the key is not set.
    pub fn from_env() -> Result<Self, RouterError> {
        Ok(Self::new(api_key_from_env(
            ProviderId::Anthropic.default_api_key_env(),
        )?))
    }

    /// Override the API base URL (no trailing slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn generate(&self, params: &GenerationParams) -> Result<String, RouterError> {
        let request = AnthropicRequest {
            model: &params.model,
            system: &params.system_prompt,
            messages: vec![ChatMessage {
                role: "user",
                content: &params.user_prompt,
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let builder = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION);
        let response = post_json(ProviderId::Anthropic, builder, &request).await?;
        let api_response: AnthropicResponse = parse_json(ProviderId::Anthropic, response).await?;

        let text: String = api_response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(call_error(ProviderId::Anthropic, "no text in response"));
        }
        Ok(text)
    }
}

// ============================================================================
// Gemini Backend
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiSystem {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

/// generateContent request payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem>,
    generation_config: GeminiGenerationConfig,
}

/// generateContent response
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Google Gemini `generateContent` backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    /// Gemini backend with an explicit key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: ProviderId::Gemini.default_base_url().to_string(),
        }
    }

    /// Gemini backend reading `GEMINI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConfigError`] if the key is not set.
    pub fn from_env() -> Result<Self, RouterError> {
        Ok(Self::new(api_key_from_env(
            ProviderId::Gemini.default_api_key_env(),
        )?))
    }

    /// Override the API base URL (no trailing slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share an existing HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn generate(&self, params: &GenerationParams) -> Result<String, RouterError> {
        let system_instruction = (!params.system_prompt.is_empty()).then(|| GeminiSystem {
            parts: vec![GeminiPart {
                text: params.system_prompt.clone(),
            }],
        });
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: params.user_prompt.clone(),
                }],
            }],
            system_instruction,
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        };

        let builder = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, params.model
            ))
            .header("x-goog-api-key", &self.api_key);
        let response = post_json(ProviderId::Gemini, builder, &request).await?;
        let api_response: GeminiResponse = parse_json(ProviderId::Gemini, response).await?;

        let text: String = api_response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(call_error(ProviderId::Gemini, "no candidates in response"));
        }
        Ok(text)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Backends keyed by provider.
///
/// The execution loop skips candidates that have no registered backend.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<ProviderId, Arc<dyn GenerationBackend>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under its own [`GenerationBackend::provider`],
    /// replacing any previous entry.
    pub fn register(&mut self, backend: Arc<dyn GenerationBackend>) {
        self.backends.insert(backend.provider(), backend);
    }

    /// Builder form of [`BackendRegistry::register`].
    pub fn with(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.register(backend);
        self
    }

    /// Backend for `provider`, if registered.
    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn GenerationBackend>> {
        self.backends.get(&provider).cloned()
    }

    /// Whether `provider` has a backend.
    pub fn contains(&self, provider: ProviderId) -> bool {
        self.backends.contains_key(&provider)
    }

    /// Registered providers in [`ProviderId::ALL`] order.
    pub fn providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|p| self.backends.contains_key(p))
            .collect()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Build the HTTP backend for `provider` from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConfigError`] if the provider's API key
    /// variable is not set.
    pub fn http_backend(
        provider: ProviderId,
        config: &RouterConfig,
        client: &reqwest::Client,
    ) -> Result<Arc<dyn GenerationBackend>, RouterError> {
        let settings = config.providers.get(provider);
        let api_key = api_key_from_env(&settings.api_key_env_for(provider))?;
        let base_url = settings.base_url_for(provider);

        let backend: Arc<dyn GenerationBackend> = match provider {
            ProviderId::OpenAi | ProviderId::Perplexity => Arc::new(
                OpenAiBackend::for_provider(provider, api_key)
                    .with_base_url(base_url)
                    .with_client(client.clone()),
            ),
            ProviderId::Anthropic => Arc::new(
                AnthropicBackend::new(api_key)
                    .with_base_url(base_url)
                    .with_client(client.clone()),
            ),
            ProviderId::Gemini => Arc::new(
                GeminiBackend::new(api_key)
                    .with_base_url(base_url)
                    .with_client(client.clone()),
            ),
        };
        Ok(backend)
    }

    /// HTTP backends for every enabled provider, sharing one client.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConfigError`] naming the first enabled
    /// provider whose API key is missing.
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let client = reqwest::Client::new();
        let mut registry = Self::new();
        for provider in config.enabled_providers() {
            registry.register(Self::http_backend(provider, config, &client)?);
        }
        Ok(registry)
    }
}
