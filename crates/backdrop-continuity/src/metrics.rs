//! Continuity engine metrics.
//!
//! - Similarity results by the tier that produced them
//! - Inheritance decisions (new vs inherited)
//! - Extraction results by description source

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Similarity scores produced, by tier.
    pub const SIMILARITY_TOTAL: &str = "background_similarity_total";

    /// Scoring tiers that yielded nothing and fell through, by tier.
    pub const TIER_FALLTHROUGH_TOTAL: &str = "background_tier_fallthrough_total";

    /// Inheritance decisions, by decision.
    pub const DECISIONS_TOTAL: &str = "background_inheritance_decisions_total";

    /// Scene descriptions resolved during extraction, by source.
    pub const EXTRACTIONS_TOTAL: &str = "background_extractions_total";
}

/// Record which tier produced a similarity score.
pub fn record_similarity(tier: &'static str) {
    counter!(names::SIMILARITY_TOTAL, "tier" => tier).increment(1);
}

/// Record a tier that failed, timed out or declined to score.
pub fn record_fallthrough(tier: &'static str) {
    counter!(names::TIER_FALLTHROUGH_TOTAL, "tier" => tier).increment(1);
}

/// Record an inheritance decision.
pub fn record_decision(inherited: bool) {
    let decision = if inherited { "inherited" } else { "new" };
    counter!(names::DECISIONS_TOTAL, "decision" => decision).increment(1);
}

/// Record where an extracted description came from.
pub fn record_extraction(source: &'static str) {
    counter!(names::EXTRACTIONS_TOTAL, "source" => source).increment(1);
}
