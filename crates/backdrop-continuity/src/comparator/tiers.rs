//! Scoring tiers of the similarity cascade.
//!
//! Each networked tier answers `Some(score)` or `None`; `None` means "fall
//! through". The token-overlap tier is the terminal strategy and always
//! produces a value.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::services::{Embedder, SimilarityRater};

use super::ScoreSource;

/// One strategy in the similarity cascade.
#[async_trait]
pub trait ScoringTier: Send + Sync {
    /// Which tier this is, for logging and metrics.
    fn source(&self) -> ScoreSource;

    /// Similarity in `[0, 1]`, or `None` to fall through.
    async fn score(&self, background_a: &str, background_b: &str) -> Option<f64>;
}

// =============================================================================
// Semantic rating
// =============================================================================

/// Asks an external model for a 0-100 rating.
pub struct SemanticTier {
    rater: Arc<dyn SimilarityRater>,
}

impl SemanticTier {
    pub fn new(rater: Arc<dyn SimilarityRater>) -> Self {
        Self { rater }
    }
}

#[async_trait]
impl ScoringTier for SemanticTier {
    fn source(&self) -> ScoreSource {
        ScoreSource::Semantic
    }

    async fn score(&self, background_a: &str, background_b: &str) -> Option<f64> {
        let reply = match self.rater.rate(background_a, background_b).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Semantic rating failed");
                return None;
            }
        };

        let text = reply.text();
        match parse_similarity_score(text) {
            Some(rating) => Some(f64::from(rating) / 100.0),
            None => {
                warn!(
                    response = %truncate(text, 100),
                    "Semantic rating reply carried no usable score"
                );
                None
            }
        }
    }
}

/// First integer anywhere in `text`, accepted only within `0..=100`.
///
/// Reasoning preambles are tolerated: "Both are kitchens, I'd say 85" parses
/// as 85. Text without digits, or whose first number is out of range,
/// yields `None`.
pub fn parse_similarity_score(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = text[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();

    // Overflowing runs are out of range by definition.
    let value: u32 = digits.parse().ok()?;
    (value <= 100).then_some(value)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// Embeddings
// =============================================================================

/// Cosine similarity of two independently fetched embeddings.
pub struct EmbeddingTier {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingTier {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl ScoringTier for EmbeddingTier {
    fn source(&self) -> ScoreSource {
        ScoreSource::Embedding
    }

    async fn score(&self, background_a: &str, background_b: &str) -> Option<f64> {
        let (a, b) = tokio::join!(
            self.embedder.embed(background_a),
            self.embedder.embed(background_b)
        );

        match (a, b) {
            (Ok(a), Ok(b)) => {
                let similarity = cosine_similarity(&a, &b);
                debug!(similarity, "Embedding similarity");
                Some(similarity.clamp(0.0, 1.0))
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Embedding fetch failed");
                None
            }
        }
    }
}

/// `dot(u, v) / (|u| * |v|)` over the common prefix of both vectors.
///
/// A zero or non-finite denominator yields 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    let similarity = dot / denominator;
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

// =============================================================================
// Token overlap
// =============================================================================

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the lowercase word sets; 0 when both are empty.
///
/// Needs no network and never fails, which makes it the terminal tier.
pub fn jaccard_similarity(background_a: &str, background_b: &str) -> f64 {
    let a = token_set(background_a);
    let b = token_set(background_b);

    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}
