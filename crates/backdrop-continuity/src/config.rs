//! Engine configuration.

use std::time::Duration;

use crate::comparator::SIMILARITY_THRESHOLD;
use crate::error::{ContinuityError, ContinuityResult};

/// Continuity engine configuration.
#[derive(Debug, Clone)]
pub struct ContinuityConfig {
    /// Minimum similarity for a scene to inherit the committed background
    pub similarity_threshold: f64,
    /// Budget for each external scoring call (semantic rating, embeddings)
    pub comparison_timeout: Duration,
    /// Budget for each external background extraction call
    pub extraction_timeout: Duration,
    /// Maximum concurrent comparisons in a best-match fan-out
    pub max_parallel_comparisons: usize,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: SIMILARITY_THRESHOLD,
            comparison_timeout: Duration::from_secs(10),
            extraction_timeout: Duration::from_secs(10),
            max_parallel_comparisons: 4,
        }
    }
}

impl ContinuityConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable numbers fall back to their defaults; a threshold outside
    /// `[0, 1]` is rejected.
    pub fn from_env() -> ContinuityResult<Self> {
        let defaults = Self::default();

        let similarity_threshold = std::env::var("BACKDROP_SIMILARITY_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.similarity_threshold);

        let config = Self {
            similarity_threshold,
            comparison_timeout: Duration::from_secs(
                std::env::var("BACKDROP_COMPARISON_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            extraction_timeout: Duration::from_secs(
                std::env::var("BACKDROP_EXTRACTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_parallel_comparisons: std::env::var("BACKDROP_MAX_PARALLEL_COMPARISONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_parallel_comparisons),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> ContinuityResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ContinuityError::config(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_parallel_comparisons == 0 {
            return Err(ContinuityError::config(
                "max parallel comparisons must be at least 1",
            ));
        }
        Ok(())
    }
}
