//! Gateway HTTP client.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::prompts;
use crate::types::{
    ChatMessage, ChatReply, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    EmbeddingVector,
};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_RATING_MODEL: &str = "openai/gpt-oss-20b:free";
const DEFAULT_EXTRACTION_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Bearer token; calls fail with `MissingApiKey` when absent
    pub api_key: Option<String>,
    /// Model used to rate background similarity
    pub rating_model: String,
    /// Model used to extract backgrounds from scene text
    pub extraction_model: String,
    /// Embedding model; `None` disables embeddings
    pub embedding_model: Option<String>,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Referer sent for gateway attribution
    pub app_url: String,
    /// Title sent for gateway attribution
    pub app_title: String,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            rating_model: DEFAULT_RATING_MODEL.to_string(),
            extraction_model: DEFAULT_EXTRACTION_MODEL.to_string(),
            embedding_model: None,
            timeout: Duration::from_secs(30),
            app_url: DEFAULT_APP_URL.to_string(),
            app_title: "Backdrop Storyboard".to_string(),
        }
    }
}

impl LlmClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: non_empty_var("OPENROUTER_API_KEY"),
            rating_model: std::env::var("BACKDROP_RATING_MODEL")
                .unwrap_or_else(|_| DEFAULT_RATING_MODEL.to_string()),
            extraction_model: std::env::var("BACKDROP_EXTRACTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_EXTRACTION_MODEL.to_string()),
            embedding_model: non_empty_var("BACKDROP_EMBEDDING_MODEL"),
            timeout: Duration::from_secs(
                std::env::var("BACKDROP_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            app_url: std::env::var("NEXT_PUBLIC_APP_URL")
                .unwrap_or_else(|_| DEFAULT_APP_URL.to_string()),
            app_title: "Backdrop Storyboard".to_string(),
        }
    }

    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Client for the chat/embeddings gateway.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmClientConfig,
}

impl LlmClient {
    /// Create a new gateway client.
    pub fn new(config: LlmClientConfig) -> LlmResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("backdrop-llm-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> LlmResult<Self> {
        Self::new(LlmClientConfig::from_env())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.config
    }

    /// Whether embedding calls can be made at all.
    pub fn embeddings_enabled(&self) -> bool {
        self.config.has_api_key() && self.config.embedding_model.is_some()
    }

    /// Ask the rating model how similar two backgrounds are.
    ///
    /// Returns the raw reply; extracting the score is up to the caller.
    pub async fn rate_similarity(&self, background_a: &str, background_b: &str) -> LlmResult<ChatReply> {
        let messages = vec![
            ChatMessage::system(prompts::RATING_SYSTEM_PROMPT),
            ChatMessage::user(prompts::similarity_prompt(background_a, background_b)),
        ];
        // Reasoning models need headroom before they emit the number.
        self.chat(&self.config.rating_model, messages, 100, 0.0).await
    }

    /// Ask the extraction model for the background of a scene.
    pub async fn describe_background(&self, scene_text: &str) -> LlmResult<String> {
        let messages = vec![
            ChatMessage::system(prompts::EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(prompts::extraction_prompt(scene_text)),
        ];
        let reply = self
            .chat(&self.config.extraction_model, messages, 100, 0.3)
            .await?;

        let text = reply.content.trim();
        if text.is_empty() {
            return Err(LlmError::invalid_response("empty extraction reply"));
        }
        Ok(text.to_string())
    }

    /// Fetch the embedding vector for a text.
    pub async fn embed(&self, text: &str) -> LlmResult<EmbeddingVector> {
        let model = self
            .config
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbeddingDisabled)?;
        let url = format!("{}/embeddings", self.config.base_url);

        debug!(model = %model, "Requesting embedding");

        let response = self
            .authorized_post(&url)?
            .json(&EmbeddingRequest { model, input: text })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, &body));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        body.into_vector()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LlmError::invalid_response("no embedding in response"))
    }

    /// Run a chat completion and return the first choice.
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        temperature: f32,
    ) -> LlmResult<ChatReply> {
        let url = format!("{}/chat/completions", self.config.base_url);

        debug!(model = %model, "Sending chat completion request");

        let response = self
            .authorized_post(&url)?
            .json(&ChatRequest {
                model,
                messages,
                max_tokens,
                temperature,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_http_status(status, &body));
        }

        let body: ChatResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        let message = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::invalid_response("no choices in response"))?;

        Ok(ChatReply {
            content: message.content.unwrap_or_default(),
            reasoning: message.reasoning,
        })
    }

    /// Client-side timeouts become [`LlmError::Timeout`].
    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.config.timeout.as_secs())
        } else {
            LlmError::Network(e)
        }
    }

    fn authorized_post(&self, url: &str) -> LlmResult<reqwest::RequestBuilder> {
        let api_key = self.config.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        Ok(self
            .http
            .post(url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.app_url)
            .header("X-Title", &self.config.app_title))
    }
}
