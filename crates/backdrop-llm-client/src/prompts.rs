//! Prompt templates sent to the gateway.

/// Maximum scene text sent for background extraction.
pub const MAX_SCENE_CHARS: usize = 500;

pub const RATING_SYSTEM_PROMPT: &str =
    "You are a semantic similarity analyzer. Return only a number from 0 to 100. No explanation needed.";

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You extract concise background/location descriptions from scene text.";

/// Prompt asking for a 0-100 similarity rating of two backgrounds.
pub fn similarity_prompt(background_a: &str, background_b: &str) -> String {
    format!(
        "Compare these two background/location descriptions and rate their similarity from 0 to 100.\n\
         Return ONLY a number (0-100), nothing else.\n\n\
         Background A: \"{}\"\n\
         Background B: \"{}\"\n\n\
         Similarity score (0-100):",
        background_a, background_b
    )
}

/// Prompt asking for the background of a scene.
pub fn extraction_prompt(scene_text: &str) -> String {
    format!(
        "Extract the background/location/setting from this scene description. \
         Return ONLY the background description (max 100 characters), nothing else.\n\n\
         Scene: {}",
        truncate_chars(scene_text, MAX_SCENE_CHARS)
    )
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
