//! External collaborators consumed by the engine.
//!
//! Each trait is one network capability. [`LlmClient`] implements all three;
//! tests substitute in-process stubs.

use async_trait::async_trait;
use backdrop_llm_client::{ChatReply, EmbeddingVector, LlmClient, LlmResult};

/// Rates how similar two background descriptions are.
#[async_trait]
pub trait SimilarityRater: Send + Sync {
    /// Free-form reply expected to contain a 0-100 rating.
    async fn rate(&self, background_a: &str, background_b: &str) -> LlmResult<ChatReply>;
}

/// Turns a description into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> LlmResult<EmbeddingVector>;
}

/// Extracts a short background description from scene text.
#[async_trait]
pub trait BackgroundDescriber: Send + Sync {
    async fn describe(&self, scene_text: &str) -> LlmResult<String>;
}

#[async_trait]
impl SimilarityRater for LlmClient {
    async fn rate(&self, background_a: &str, background_b: &str) -> LlmResult<ChatReply> {
        self.rate_similarity(background_a, background_b).await
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> LlmResult<EmbeddingVector> {
        LlmClient::embed(self, text).await
    }
}

#[async_trait]
impl BackgroundDescriber for LlmClient {
    async fn describe(&self, scene_text: &str) -> LlmResult<String> {
        self.describe_background(scene_text).await
    }
}
