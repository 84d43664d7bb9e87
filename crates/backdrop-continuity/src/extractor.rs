//! Background extraction from scene text.
//!
//! Builds the per-project background library from segmented scenes and
//! provides the text helpers (normalization, keywords, validation) shared
//! by the rest of the engine.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use backdrop_models::{BackgroundCandidate, SceneInput};

use crate::error::BackgroundInputError;
use crate::metrics;
use crate::services::BackgroundDescriber;

/// Description used when nothing in a scene names a location.
pub const FALLBACK_BACKGROUND: &str = "Generic indoor setting";

/// Longest describer reply accepted as a background.
const MAX_DESCRIBED_CHARS: usize = 200;

const MIN_INPUT_CHARS: usize = 3;
const MAX_INPUT_CHARS: usize = 200;

/// Keyword overlap a library entry needs to count as a match.
const MATCH_THRESHOLD: f64 = 0.3;

/// Word-set similarity above which two descriptions are duplicates.
const DUPLICATE_THRESHOLD: f64 = 0.9;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "in", "on", "at", "to", "for", "of", "with", "is", "are", "was", "were",
    "be", "been", "being", "have", "has", "had", "do", "does", "did", "will", "would", "should",
    "could", "may", "might",
];

const LOCATION_NOUNS: &[&str] = &[
    "forest", "city", "street", "room", "office", "house", "building", "park", "beach",
    "mountain", "desert", "ocean", "lake", "river", "classroom", "restaurant", "cafe", "shop",
    "store", "mall", "hospital", "airport", "station", "subway", "train", "garden", "yard",
    "field", "farm", "barn",
];

static LOCATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:in|at|inside|outside|exterior|interior)\s+(?:(?:a|an|the)\s+)?([^,.;]+)")
            .unwrap(),
        Regex::new(r"(?i)\b(?:setting|location|background):\s*([^,.;]+)").unwrap(),
        Regex::new(r"(?i)\b(?:takes place in|set in)\s+([^,.;]+)").unwrap(),
    ]
});

static EXCESSIVE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!!!|\?\?\?|\.\.\.\.").unwrap());

// =============================================================================
// Extractor
// =============================================================================

/// Where a scene's background description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// The scene's explicit `background` field
    Explicit,
    /// The external describer
    Describer,
    /// Location heuristics over the shot description
    ShotDescription,
    /// Location heuristics over the raw scene text
    RawText,
    /// Nothing matched
    Fallback,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Explicit => "explicit",
            ExtractionSource::Describer => "describer",
            ExtractionSource::ShotDescription => "shot_description",
            ExtractionSource::RawText => "raw_text",
            ExtractionSource::Fallback => "fallback",
        }
    }
}

/// Resolves background descriptions for scenes and builds the library.
#[derive(Clone)]
pub struct BackgroundExtractor {
    describer: Option<Arc<dyn BackgroundDescriber>>,
    timeout: Duration,
}

impl BackgroundExtractor {
    /// Create an extractor backed by an external describer.
    pub fn new(describer: Option<Arc<dyn BackgroundDescriber>>, timeout: Duration) -> Self {
        Self { describer, timeout }
    }

    /// Extractor that only uses local heuristics.
    pub fn offline() -> Self {
        Self::new(None, Duration::from_secs(10))
    }

    /// Build the deduplicated background library for a script.
    ///
    /// Scenes whose descriptions normalize to the same text share one
    /// candidate; their orders are appended to `scene_indices`. Output keeps
    /// first-seen order.
    pub async fn extract_backgrounds(&self, scenes: &[SceneInput]) -> Vec<BackgroundCandidate> {
        let mut candidates: Vec<BackgroundCandidate> = Vec::new();
        let mut by_normalized: HashMap<String, usize> = HashMap::new();

        for scene in scenes {
            let (description, _) = self.resolve_description(scene).await;
            let normalized = normalize_background(&description);

            match by_normalized.get(&normalized) {
                Some(&idx) => candidates[idx].attach_scene(scene.order),
                None => {
                    let candidate = create_unique_background(&description).with_scene(scene.order);
                    by_normalized.insert(normalized, candidates.len());
                    candidates.push(candidate);
                }
            }
        }

        debug!(
            scenes = scenes.len(),
            backgrounds = candidates.len(),
            "Extracted background library"
        );
        candidates
    }

    /// Resolve the background description of one scene.
    ///
    /// Priority: explicit field, external describer, heuristics over the shot
    /// description, heuristics over the raw text, fixed fallback.
    pub async fn resolve_description(&self, scene: &SceneInput) -> (String, ExtractionSource) {
        let (description, source) = self.resolve_inner(scene).await;
        metrics::record_extraction(source.as_str());
        (description, source)
    }

    async fn resolve_inner(&self, scene: &SceneInput) -> (String, ExtractionSource) {
        if let Some(explicit) = scene.background.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return (explicit.to_string(), ExtractionSource::Explicit);
        }

        if let Some(text) = scene.scene_text() {
            if let Some(described) = self.describe(text).await {
                return (described, ExtractionSource::Describer);
            }
        }

        if let Some(found) = scene
            .shot_description
            .as_deref()
            .and_then(extract_background_from_description)
        {
            return (found, ExtractionSource::ShotDescription);
        }

        if let Some(found) = scene.raw.as_deref().and_then(extract_background_from_description) {
            return (found, ExtractionSource::RawText);
        }

        (FALLBACK_BACKGROUND.to_string(), ExtractionSource::Fallback)
    }

    /// Best-effort describer call; every failure mode yields `None`.
    async fn describe(&self, scene_text: &str) -> Option<String> {
        let describer = self.describer.as_ref()?;

        match tokio::time::timeout(self.timeout, describer.describe(scene_text)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                let chars = text.chars().count();
                if chars == 0 || chars > MAX_DESCRIBED_CHARS {
                    warn!(chars, "Discarding describer reply with unusable length");
                    return None;
                }
                Some(text.to_string())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Background extraction failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Background extraction timed out"
                );
                None
            }
        }
    }
}

impl Default for BackgroundExtractor {
    fn default() -> Self {
        Self::offline()
    }
}

// =============================================================================
// Heuristics
// =============================================================================

/// Find a location phrase in free text.
///
/// Tries the location patterns first, then a window of up to five words
/// around the first known location noun.
pub fn extract_background_from_description(text: &str) -> Option<String> {
    for pattern in LOCATION_PATTERNS.iter() {
        if let Some(found) = pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
        {
            return Some(found.to_string());
        }
    }

    let lower = text.to_lowercase();
    let noun = LOCATION_NOUNS.iter().find(|noun| lower.contains(*noun))?;

    let words: Vec<&str> = text.split_whitespace().collect();
    let hit = words.iter().position(|w| w.to_lowercase().contains(noun))?;
    let start = hit.saturating_sub(2);
    let end = (hit + 3).min(words.len());
    Some(words[start..end].join(" "))
}

// =============================================================================
// Text helpers
// =============================================================================

/// Replace every non-word, non-space character with a space and lowercase.
fn strip_punctuation(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Canonical form used for deduplication and comparison.
pub fn normalize_background(text: &str) -> String {
    strip_punctuation(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content words of a description: longer than two characters, not a stop
/// word, unique in first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    strip_punctuation(text)
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// A library entry for a description that matched nothing.
pub fn create_unique_background(description: &str) -> BackgroundCandidate {
    BackgroundCandidate::new(description, extract_keywords(description))
}

/// Keyword-overlap match against the library.
///
/// Scores each candidate by shared keywords over the larger keyword count;
/// the best candidate is returned only above 0.3.
pub fn find_matching_background<'a>(
    description: &str,
    candidates: &'a [BackgroundCandidate],
) -> Option<&'a BackgroundCandidate> {
    let keywords = extract_keywords(description);
    let mut best: Option<(&BackgroundCandidate, f64)> = None;

    for candidate in candidates {
        let denominator = keywords.len().max(candidate.keywords.len());
        let score = if denominator == 0 {
            0.0
        } else {
            let common = keywords.iter().filter(|k| candidate.keywords.contains(k)).count();
            common as f64 / denominator as f64
        };

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.filter(|(_, score)| *score > MATCH_THRESHOLD)
        .map(|(candidate, _)| candidate)
}

/// Whether a description duplicates an existing library entry.
pub fn is_duplicate_background(description: &str, candidates: &[BackgroundCandidate]) -> bool {
    let normalized = normalize_background(description);

    candidates.iter().any(|existing| {
        let existing = normalize_background(&existing.description);
        normalized == existing || word_set_similarity(&normalized, &existing) > DUPLICATE_THRESHOLD
    })
}

fn word_set_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Validate a user-typed background description.
pub fn validate_background_input(input: &str) -> Result<(), BackgroundInputError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(BackgroundInputError::Empty);
    }

    let chars = trimmed.chars().count();
    if chars < MIN_INPUT_CHARS {
        return Err(BackgroundInputError::TooShort);
    }
    if chars > MAX_INPUT_CHARS {
        return Err(BackgroundInputError::TooLong);
    }

    if trimmed.contains(['<', '>', '{', '}', '[', ']']) {
        return Err(BackgroundInputError::InvalidCharacters);
    }

    if EXCESSIVE_PUNCTUATION.is_match(trimmed) {
        return Err(BackgroundInputError::ExcessivePunctuation);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backdrop_llm_client::{LlmError, LlmResult};

    struct FixedDescriber(String);

    #[async_trait]
    impl BackgroundDescriber for FixedDescriber {
        async fn describe(&self, _scene_text: &str) -> LlmResult<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingDescriber;

    #[async_trait]
    impl BackgroundDescriber for FailingDescriber {
        async fn describe(&self, _scene_text: &str) -> LlmResult<String> {
            Err(LlmError::ServiceUnavailable("down".into()))
        }
    }

    struct SlowDescriber;

    #[async_trait]
    impl BackgroundDescriber for SlowDescriber {
        async fn describe(&self, _scene_text: &str) -> LlmResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    fn candidate(description: &str) -> BackgroundCandidate {
        create_unique_background(description)
    }

    #[test]
    fn test_normalize_background() {
        assert_eq!(normalize_background("  Coffee-Shop,  INTERIOR! "), "coffee shop interior");
        assert_eq!(normalize_background("...!"), "");
    }

    #[test]
    fn test_extract_keywords_drops_stop_words_and_short_tokens() {
        assert_eq!(
            extract_keywords("The old barn, in the old field at dawn"),
            vec!["old", "barn", "field", "dawn"]
        );
        assert!(extract_keywords("in a an").is_empty());
    }

    #[test]
    fn test_pattern_heuristics() {
        assert_eq!(
            extract_background_from_description("She waits inside the abandoned warehouse, alone.").as_deref(),
            Some("abandoned warehouse")
        );
        assert_eq!(
            extract_background_from_description("Setting: rooftop garden; night").as_deref(),
            Some("rooftop garden")
        );
        assert_eq!(
            extract_background_from_description("The story takes place in Victorian London.").as_deref(),
            Some("Victorian London")
        );
    }

    #[test]
    fn test_location_noun_window() {
        assert_eq!(
            extract_background_from_description("Two kids race bikes down a dusty street toward home").as_deref(),
            Some("a dusty street toward home")
        );
        assert_eq!(extract_background_from_description("Close-up of trembling hands"), None);
    }

    #[test]
    fn test_find_matching_background() {
        let library = vec![candidate("Sunny city park with pond"), candidate("Dark office at night")];

        let found = find_matching_background("park pond ducks", &library).unwrap();
        assert_eq!(found.description, "Sunny city park with pond");

        assert!(find_matching_background("underwater cave", &library).is_none());
        assert!(find_matching_background("park", &[]).is_none());
    }

    #[test]
    fn test_duplicate_detection() {
        assert!(is_duplicate_background("Coffee Shop", &[candidate("coffee shop")]));
        assert!(is_duplicate_background("coffee shop!", &[candidate("Coffee shop")]));
        assert!(!is_duplicate_background("coffee shop terrace", &[candidate("coffee shop")]));
        assert!(!is_duplicate_background("anything", &[]));
    }

    #[test]
    fn test_near_duplicate_word_sets() {
        // 10 shared words out of 11 distinct ones
        let existing = candidate("one two three four five six seven eight nine ten");
        assert!(is_duplicate_background(
            "one two three four five six seven eight nine ten eleven",
            &[existing]
        ));
    }

    #[test]
    fn test_validation_boundaries() {
        assert_eq!(validate_background_input(""), Err(BackgroundInputError::Empty));
        assert_eq!(validate_background_input("   "), Err(BackgroundInputError::Empty));
        assert_eq!(validate_background_input("ab"), Err(BackgroundInputError::TooShort));
        assert_eq!(validate_background_input(&"a".repeat(201)), Err(BackgroundInputError::TooLong));
        assert!(validate_background_input(&"a".repeat(200)).is_ok());
        assert_eq!(validate_background_input("a<b>c"), Err(BackgroundInputError::InvalidCharacters));
        assert_eq!(validate_background_input("wow!!!"), Err(BackgroundInputError::ExcessivePunctuation));
        assert_eq!(validate_background_input("wait...."), Err(BackgroundInputError::ExcessivePunctuation));
        assert!(validate_background_input("wait...").is_ok());
        assert!(validate_background_input("sunset rooftop").is_ok());
    }

    #[tokio::test]
    async fn test_extract_backgrounds_priority_and_dedup() {
        let extractor = BackgroundExtractor::offline();
        let scenes = vec![
            SceneInput::new(0).with_background("Coffee shop"),
            SceneInput::new(1).with_shot_description("Close on the barista"),
            SceneInput::new(2).with_background("coffee shop!"),
            SceneInput::new(3).with_raw("EXT. They argue at the train station, loudly"),
        ];

        let library = extractor.extract_backgrounds(&scenes).await;

        assert_eq!(library.len(), 3);
        assert_eq!(library[0].description, "Coffee shop");
        assert_eq!(library[0].scene_indices, vec![0, 2]);
        assert_eq!(library[1].description, FALLBACK_BACKGROUND);
        assert_eq!(library[2].description, "train station");
        assert_eq!(library[2].scene_indices, vec![3]);
    }

    #[tokio::test]
    async fn test_describer_takes_precedence_over_heuristics() {
        let extractor = BackgroundExtractor::new(
            Some(Arc::new(FixedDescriber("Moonlit harbor".to_string()))),
            Duration::from_secs(1),
        );
        let scene = SceneInput::new(0).with_shot_description("Boats inside the harbor");

        let (description, source) = extractor.resolve_description(&scene).await;
        assert_eq!(description, "Moonlit harbor");
        assert_eq!(source, ExtractionSource::Describer);

        let explicit = scene.clone().with_background("Pier 9");
        let (description, source) = extractor.resolve_description(&explicit).await;
        assert_eq!(description, "Pier 9");
        assert_eq!(source, ExtractionSource::Explicit);
    }

    #[tokio::test]
    async fn test_describer_failure_falls_back_to_heuristics() {
        let extractor = BackgroundExtractor::new(Some(Arc::new(FailingDescriber)), Duration::from_secs(1));
        let scene = SceneInput::new(0).with_shot_description("Boats inside the harbor");

        let (description, source) = extractor.resolve_description(&scene).await;
        assert_eq!(description, "harbor");
        assert_eq!(source, ExtractionSource::ShotDescription);
    }

    #[tokio::test(start_paused = true)]
    async fn test_describer_timeout_is_swallowed() {
        let extractor = BackgroundExtractor::new(Some(Arc::new(SlowDescriber)), Duration::from_secs(10));
        let scene = SceneInput::new(0).with_raw("Nothing useful here");

        let (description, source) = extractor.resolve_description(&scene).await;
        assert_eq!(description, FALLBACK_BACKGROUND);
        assert_eq!(source, ExtractionSource::Fallback);
    }

    #[tokio::test]
    async fn test_overlong_describer_reply_is_discarded() {
        let extractor = BackgroundExtractor::new(
            Some(Arc::new(FixedDescriber("x".repeat(201)))),
            Duration::from_secs(1),
        );
        let scene = SceneInput::new(0).with_shot_description("A quiet beach, gulls overhead");

        let (description, source) = extractor.resolve_description(&scene).await;
        assert_eq!(source, ExtractionSource::ShotDescription);
        assert_eq!(description, "A quiet beach, gulls overhead");
    }
}
