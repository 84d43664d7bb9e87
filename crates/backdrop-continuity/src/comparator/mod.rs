//! Background similarity cascade.
//!
//! `compare_backgrounds` tries, in order, until one yields a score:
//! 1. Exact match (case-insensitive, trimmed)
//! 2. Configured tiers (semantic rating, then embeddings), each raced
//!    against the comparison timeout
//! 3. Token-overlap Jaccard, which always answers
//!
//! A failing, slow or malformed tier is indistinguishable from an absent one:
//! the cascade moves on and the caller always gets a score in `[0, 1]`.
//! There is no retry; falling through to a cheaper tier is the recovery.

pub mod tiers;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use backdrop_llm_client::LlmClient;

use crate::config::ContinuityConfig;
use crate::metrics;
use crate::services::{Embedder, SimilarityRater};

pub use tiers::{
    cosine_similarity, jaccard_similarity, parse_similarity_score, EmbeddingTier, ScoringTier,
    SemanticTier,
};

/// Default similarity at or above which two backgrounds are the same place.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Which step of the cascade produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    ExactMatch,
    Semantic,
    Embedding,
    TokenOverlap,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::ExactMatch => "exact_match",
            ScoreSource::Semantic => "semantic",
            ScoreSource::Embedding => "embedding",
            ScoreSource::TokenOverlap => "token_overlap",
        }
    }
}

/// A similarity score and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    pub score: f64,
    pub source: ScoreSource,
}

/// Result of a best-match search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    /// Index into the candidate slice
    pub index: usize,
    pub score: f64,
}

/// Scores background descriptions against each other.
pub struct BackgroundComparator {
    tiers: Vec<Box<dyn ScoringTier>>,
    timeout: Duration,
    max_parallel: usize,
}

impl BackgroundComparator {
    pub fn builder() -> ComparatorBuilder {
        ComparatorBuilder::default()
    }

    /// Comparator with no networked tiers (exact match and token overlap only).
    pub fn offline() -> Self {
        Self::builder().build()
    }

    /// Comparator backed by the gateway client.
    ///
    /// The semantic tier is enabled when an API key is configured, the
    /// embedding tier when an embedding model is configured as well.
    pub fn from_client(client: Arc<LlmClient>, config: &ContinuityConfig) -> Self {
        let mut builder = Self::builder()
            .timeout(config.comparison_timeout)
            .max_parallel(config.max_parallel_comparisons);

        if client.config().has_api_key() {
            builder = builder.semantic(client.clone());
        } else {
            warn!("OPENROUTER_API_KEY not set, semantic background comparison disabled");
        }
        if client.embeddings_enabled() {
            builder = builder.embeddings(client);
        }

        builder.build()
    }

    /// Number of networked tiers in the cascade.
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Similarity of two descriptions in `[0, 1]`. Never fails.
    pub async fn compare_backgrounds(&self, background_a: &str, background_b: &str) -> f64 {
        self.compare_detailed(background_a, background_b).await.score
    }

    /// Like [`compare_backgrounds`](Self::compare_backgrounds), also
    /// reporting which tier answered.
    pub async fn compare_detailed(&self, background_a: &str, background_b: &str) -> SimilarityScore {
        let a = background_a.trim();
        let b = background_b.trim();

        if a.to_lowercase() == b.to_lowercase() {
            return self.finish(a, b, 1.0, ScoreSource::ExactMatch);
        }

        for tier in &self.tiers {
            let source = tier.source();
            match tokio::time::timeout(self.timeout, tier.score(a, b)).await {
                Ok(Some(score)) if score.is_finite() => {
                    return self.finish(a, b, score.clamp(0.0, 1.0), source);
                }
                Ok(_) => {
                    debug!(tier = source.as_str(), "Scoring tier fell through");
                }
                Err(_) => {
                    warn!(
                        tier = source.as_str(),
                        timeout_secs = self.timeout.as_secs(),
                        "Scoring tier timed out"
                    );
                }
            }
            metrics::record_fallthrough(source.as_str());
        }

        self.finish(a, b, jaccard_similarity(a, b), ScoreSource::TokenOverlap)
    }

    fn finish(&self, a: &str, b: &str, score: f64, source: ScoreSource) -> SimilarityScore {
        debug!(
            prev = %preview(a),
            curr = %preview(b),
            score = %format!("{:.3}", score),
            method = source.as_str(),
            "Background similarity"
        );
        metrics::record_similarity(source.as_str());
        SimilarityScore { score, source }
    }

    /// Whether two descriptions are the same place at `threshold`.
    pub async fn is_same_location(&self, background_a: &str, background_b: &str, threshold: f64) -> bool {
        self.compare_backgrounds(background_a, background_b).await >= threshold
    }

    /// Best-scoring candidate for `current`, if it reaches `threshold`.
    ///
    /// Candidates are compared concurrently, at most `max_parallel` at a
    /// time. Ties keep the earliest candidate.
    pub async fn find_best_match<S: AsRef<str>>(
        &self,
        current: &str,
        candidates: &[S],
        threshold: f64,
    ) -> Option<BestMatch> {
        if candidates.is_empty() {
            return None;
        }

        let scores: Vec<f64> = stream::iter(
            candidates
                .iter()
                .map(|candidate| self.compare_backgrounds(candidate.as_ref(), current)),
        )
        .buffered(self.max_parallel)
        .collect()
        .await;

        let mut best: Option<BestMatch> = None;
        for (index, score) in scores.into_iter().enumerate() {
            if best.map_or(true, |b| score > b.score) {
                best = Some(BestMatch { index, score });
            }
        }

        best.filter(|b| b.score >= threshold)
    }
}

impl Default for BackgroundComparator {
    fn default() -> Self {
        Self::offline()
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(50) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Assembles a comparator's tier list.
///
/// Tiers run in the order they are added.
pub struct ComparatorBuilder {
    tiers: Vec<Box<dyn ScoringTier>>,
    timeout: Duration,
    max_parallel: usize,
}

impl Default for ComparatorBuilder {
    fn default() -> Self {
        let defaults = ContinuityConfig::default();
        Self {
            tiers: Vec::new(),
            timeout: defaults.comparison_timeout,
            max_parallel: defaults.max_parallel_comparisons,
        }
    }
}

impl ComparatorBuilder {
    /// Per-tier time budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fan-out limit for best-match searches.
    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn semantic(self, rater: Arc<dyn SimilarityRater>) -> Self {
        self.tier(SemanticTier::new(rater))
    }

    pub fn embeddings(self, embedder: Arc<dyn Embedder>) -> Self {
        self.tier(EmbeddingTier::new(embedder))
    }

    /// Append an arbitrary tier.
    pub fn tier(mut self, tier: impl ScoringTier + 'static) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    pub fn build(self) -> BackgroundComparator {
        BackgroundComparator {
            tiers: self.tiers,
            timeout: self.timeout,
            max_parallel: self.max_parallel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use backdrop_llm_client::{ChatReply, EmbeddingVector, LlmError, LlmResult};

    struct ReplyRater(&'static str);

    #[async_trait]
    impl SimilarityRater for ReplyRater {
        async fn rate(&self, _a: &str, _b: &str) -> LlmResult<ChatReply> {
            Ok(ChatReply {
                content: self.0.to_string(),
                reasoning: None,
            })
        }
    }

    struct DownRater;

    #[async_trait]
    impl SimilarityRater for DownRater {
        async fn rate(&self, _a: &str, _b: &str) -> LlmResult<ChatReply> {
            Err(LlmError::MissingApiKey)
        }
    }

    struct HangingRater;

    #[async_trait]
    impl SimilarityRater for HangingRater {
        async fn rate(&self, _a: &str, _b: &str) -> LlmResult<ChatReply> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ChatReply::default())
        }
    }

    /// Embeds "red" and "crimson" close together, everything else orthogonal.
    struct ColorEmbedder;

    #[async_trait]
    impl Embedder for ColorEmbedder {
        async fn embed(&self, text: &str) -> LlmResult<EmbeddingVector> {
            Ok(match text {
                "red room" => vec![1.0, 0.1, 0.0],
                "crimson room" => vec![0.9, 0.2, 0.0],
                "opposite" => vec![-1.0, 0.0, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            })
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> LlmResult<EmbeddingVector> {
            Err(LlmError::EmbeddingDisabled)
        }
    }

    struct CountingTier(Arc<AtomicUsize>);

    #[async_trait]
    impl ScoringTier for CountingTier {
        fn source(&self) -> ScoreSource {
            ScoreSource::Semantic
        }

        async fn score(&self, a: &str, _b: &str) -> Option<f64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(match a {
                "best" => 0.9,
                "good" => 0.7,
                _ => 0.1,
            })
        }
    }

    struct SlowTier;

    #[async_trait]
    impl ScoringTier for SlowTier {
        fn source(&self) -> ScoreSource {
            ScoreSource::Semantic
        }

        async fn score(&self, _a: &str, _b: &str) -> Option<f64> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some(0.7)
        }
    }

    #[tokio::test]
    async fn test_exact_match_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let comparator = BackgroundComparator::builder()
            .tier(CountingTier(calls.clone()))
            .build();

        let result = comparator.compare_detailed("  Coffee Shop ", "coffee shop").await;
        assert_eq!(result.score, 1.0);
        assert_eq!(result.source, ScoreSource::ExactMatch);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_semantic_tier_wins_first() {
        let comparator = BackgroundComparator::builder()
            .semantic(Arc::new(ReplyRater("I'd rate these 72")))
            .embeddings(Arc::new(ColorEmbedder))
            .build();

        let result = comparator.compare_detailed("red room", "crimson room").await;
        assert_eq!(result.source, ScoreSource::Semantic);
        assert!((result.score - 0.72).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_rating_falls_through_to_embeddings() {
        let comparator = BackgroundComparator::builder()
            .semantic(Arc::new(ReplyRater("They look alike")))
            .embeddings(Arc::new(ColorEmbedder))
            .build();

        let result = comparator.compare_detailed("red room", "crimson room").await;
        assert_eq!(result.source, ScoreSource::Embedding);
        assert!(result.score > 0.9);
    }

    #[tokio::test]
    async fn test_out_of_range_rating_falls_through() {
        let comparator = BackgroundComparator::builder()
            .semantic(Arc::new(ReplyRater("250")))
            .build();

        let result = comparator.compare_detailed("red room", "blue room").await;
        assert_eq!(result.source, ScoreSource::TokenOverlap);
        assert!((result.score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_negative_cosine_clamps_to_zero() {
        let comparator = BackgroundComparator::builder()
            .embeddings(Arc::new(ColorEmbedder))
            .build();

        let result = comparator.compare_detailed("red room", "opposite").await;
        assert_eq!(result.source, ScoreSource::Embedding);
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn test_all_tiers_failing_reaches_jaccard() {
        let comparator = BackgroundComparator::builder()
            .semantic(Arc::new(DownRater))
            .embeddings(Arc::new(FailingEmbedder))
            .build();

        let result = comparator
            .compare_detailed(
                "coffee shop tables chairs interior",
                "coffee shop interior wooden tables chairs",
            )
            .await;
        assert_eq!(result.source, ScoreSource::TokenOverlap);
        assert!(result.score > 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_tier_times_out() {
        let comparator = BackgroundComparator::builder()
            .timeout(Duration::from_secs(10))
            .semantic(Arc::new(HangingRater))
            .build();

        let result = comparator
            .compare_detailed("office glass walls", "park trees grass pond ducks")
            .await;
        assert_eq!(result.source, ScoreSource::TokenOverlap);
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn test_offline_properties() {
        let comparator = BackgroundComparator::offline();

        for s in ["", "Forest", "a rainy rooftop at night"] {
            assert_eq!(comparator.compare_backgrounds(s, s).await, 1.0);
        }

        let pairs = [
            ("abandoned warehouse", "warehouse loading dock"),
            ("beach", "mountain cabin"),
            ("", "desert"),
        ];
        for (a, b) in pairs {
            let score = comparator.compare_backgrounds(a, b).await;
            assert!((0.0..=1.0).contains(&score));
            for threshold in [0.0, 0.3, 0.6, 1.0] {
                assert_eq!(
                    comparator.is_same_location(a, b, threshold).await,
                    score >= threshold
                );
            }
        }
    }

    #[tokio::test]
    async fn test_find_best_match_picks_highest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let comparator = BackgroundComparator::builder()
            .tier(CountingTier(calls.clone()))
            .max_parallel(2)
            .build();

        let candidates = ["meh", "good", "best", "meh again"];
        let found = comparator
            .find_best_match("current", &candidates, SIMILARITY_THRESHOLD)
            .await
            .unwrap();

        assert_eq!(found.index, 2);
        assert!((found.score - 0.9).abs() < 1e-9);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_find_best_match_respects_threshold() {
        let comparator = BackgroundComparator::builder()
            .tier(CountingTier(Arc::new(AtomicUsize::new(0))))
            .build();

        assert!(comparator
            .find_best_match("current", &["good"], 0.8)
            .await
            .is_none());
        assert!(comparator
            .find_best_match("current", &["good"], 0.7)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_find_best_match_ties_keep_first() {
        let comparator = BackgroundComparator::builder()
            .tier(CountingTier(Arc::new(AtomicUsize::new(0))))
            .build();

        let found = comparator
            .find_best_match("current", &["good", "best", "best"], 0.5)
            .await
            .unwrap();
        assert_eq!(found.index, 1);
    }

    #[tokio::test]
    async fn test_find_best_match_empty_makes_no_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let comparator = BackgroundComparator::builder()
            .tier(CountingTier(calls.clone()))
            .build();

        let empty: [&str; 0] = [];
        assert!(comparator.find_best_match("current", &empty, 0.0).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_best_match_runs_comparisons_concurrently() {
        let comparator = BackgroundComparator::builder()
            .tier(SlowTier)
            .timeout(Duration::from_secs(30))
            .max_parallel(4)
            .build();

        let start = tokio::time::Instant::now();
        let found = comparator
            .find_best_match("current", &["a", "b", "c", "d"], 0.5)
            .await;

        assert_eq!(found, Some(BestMatch { index: 0, score: 0.7 }));
        assert_eq!(start.elapsed().as_secs(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_best_match_respects_parallel_limit() {
        let comparator = BackgroundComparator::builder()
            .tier(SlowTier)
            .timeout(Duration::from_secs(30))
            .max_parallel(2)
            .build();

        let start = tokio::time::Instant::now();
        comparator
            .find_best_match("current", &["a", "b", "c", "d"], 0.5)
            .await;

        assert_eq!(start.elapsed().as_secs(), 10);
    }
}
