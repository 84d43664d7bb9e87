//! Continuity engine error types.
//!
//! Scoring and extraction never fail outward: external-service problems are
//! absorbed by the cascade. The only errors surfaced here are invalid
//! user-supplied background text and invalid configuration.

use thiserror::Error;

pub type ContinuityResult<T> = Result<T, ContinuityError>;

#[derive(Debug, Error)]
pub enum ContinuityError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    InvalidInput(#[from] BackgroundInputError),
}

impl ContinuityError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Rejection reasons for a user-supplied background description.
///
/// The `Display` text is meant to be shown to the user as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BackgroundInputError {
    #[error("Background description cannot be empty")]
    Empty,

    #[error("Background description must be at least 3 characters")]
    TooShort,

    #[error("Background description must be at most 200 characters")]
    TooLong,

    #[error("Background description contains invalid characters")]
    InvalidCharacters,

    #[error("Please use standard punctuation")]
    ExcessivePunctuation,
}
