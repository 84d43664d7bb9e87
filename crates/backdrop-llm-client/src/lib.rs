//! Client for the language-model gateway used by the continuity engine.
//!
//! The gateway speaks the OpenAI-compatible REST dialect (OpenRouter by
//! default) and backs three calls:
//! - Rating how similar two background descriptions are (0-100)
//! - Extracting a short background description from scene text
//! - Embedding a description into a vector

pub mod client;
pub mod error;
pub mod prompts;
pub mod types;


pub use client::{LlmClient, LlmClientConfig};
pub use error::{LlmError, LlmResult};
pub use types::{ChatMessage, ChatReply, EmbeddingVector};
