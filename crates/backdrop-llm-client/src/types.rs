//! Gateway request/response types.

use serde::{Deserialize, Serialize};

/// Embedding vector returned by the gateway.
pub type EmbeddingVector = Vec<f32>;

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning models may leave `content` empty and answer here
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Text of the first chat choice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub reasoning: Option<String>,
}

impl ChatReply {
    /// Trimmed content, falling back to the reasoning text when content is empty.
    pub fn text(&self) -> &str {
        let content = self.content.trim();
        if !content.is_empty() {
            return content;
        }
        self.reasoning.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Embedding request.
#[derive(Debug, Serialize)]
pub(crate) struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
}

/// Embedding response.
///
/// Accepts the OpenAI shape (`data[0].embedding`) as well as a bare
/// top-level `embedding` array.
#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
    #[serde(default)]
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub embedding: Option<EmbeddingVector>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingData {
    pub embedding: EmbeddingVector,
}

impl EmbeddingResponse {
    pub fn into_vector(self) -> Option<EmbeddingVector> {
        self.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .or(self.embedding)
    }
}
