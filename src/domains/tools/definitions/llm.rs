//! Chat completion backends used by the Gemini, Kimi K2 and Perplexity tools.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

use super::common::{http_client, json_response};
use crate::domains::tools::{IntegrationError, ToolError};

/// One stateless completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ignored by backends that do not search the web.
    pub search: SearchFilter,
}

/// Constraints on the web search behind a grounded answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// `day`, `week`, `month` or `year`.
    pub recency: Option<String>,
    pub domains: Vec<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4096,
            search: SearchFilter::default(),
        }
    }

    pub fn search(mut self, search: SearchFilter) -> Self {
        self.search = search;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
    /// Sources the answer was grounded on, when the backend reports them.
    pub citations: Vec<String>,
}

/// A model that turns a prompt into text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ToolError>;

    fn model(&self) -> &str;
}

// ============================================================================
// Gemini
// ============================================================================

/// Google Gemini `generateContent` client.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(api_key)?);

        Ok(Self {
            client: http_client(timeout, headers)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens
            }
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ToolError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .json(&Self::build_body(&request))
            .send()
            .await?;
        let parsed: GeminiResponse = json_response("Gemini", response).await?;

        let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
            let reason = parsed
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates returned");
            ToolError::upstream(format!("Gemini returned no answer: {}", reason))
        })?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ToolError::upstream(format!(
                "Gemini returned an empty answer (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let usage = parsed.usage_metadata.unwrap_or_default();
        Ok(Completion {
            text,
            model: self.model.clone(),
            usage: TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            },
            citations: Vec::new(),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Groq (OpenAI-compatible chat completions)
// ============================================================================

/// Groq chat completions client.
pub struct GroqBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GroqBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GroqBackend {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        Ok(Self {
            client: http_client(timeout, bearer(api_key)?)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionBackend for GroqBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ToolError> {
        let body = chat_body(&self.model, &request);
        let url = format!("{}/chat/completions", self.base_url);
        chat_completion("Groq", self.client.post(&url).json(&body), &self.model).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Perplexity (search-grounded chat completions)
// ============================================================================

/// Perplexity chat completions client; answers come with citations.
pub struct PerplexityBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for PerplexityBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerplexityBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl PerplexityBackend {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        Ok(Self {
            client: http_client(timeout, bearer(api_key)?)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut body = chat_body(&self.model, request);
        if let Some(recency) = &request.search.recency {
            body["search_recency_filter"] = json!(recency);
        }
        if !request.search.domains.is_empty() {
            body["search_domain_filter"] = json!(request.search.domains);
        }
        body
    }
}

#[async_trait]
impl CompletionBackend for PerplexityBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ToolError> {
        let body = self.build_body(&request);
        let url = format!("{}/chat/completions", self.base_url);
        chat_completion("Perplexity", self.client.post(&url).json(&body), &self.model).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// OpenAI-compatible wire format
// ============================================================================

fn bearer(api_key: &str) -> Result<HeaderMap, IntegrationError> {
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

fn chat_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
}

async fn chat_completion(
    service: &str,
    request: reqwest::RequestBuilder,
    default_model: &str,
) -> Result<Completion, ToolError> {
    let parsed: ChatResponse = json_response(service, request.send().await?).await?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ToolError::upstream(format!("{} returned an empty answer", service)))?;

    let citations = if parsed.citations.is_empty() {
        parsed.search_results.into_iter().map(|r| r.url).collect()
    } else {
        parsed.citations
    };
    let usage = parsed.usage.unwrap_or_default();
    Ok(Completion {
        text,
        model: parsed.model.unwrap_or_else(|| default_model.to_string()),
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
        citations,
    })
}
