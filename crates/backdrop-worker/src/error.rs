//! Worker error types.

use backdrop_continuity::{BackgroundInputError, ContinuityError};
use backdrop_llm_client::LlmError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Scene {order}: {source}")]
    InvalidScene {
        order: u32,
        #[source]
        source: BackgroundInputError,
    },

    #[error("Continuity error: {0}")]
    Continuity(#[from] ContinuityError),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }
}
