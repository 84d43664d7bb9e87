//! Background continuity engine.
//!
//! Decides, scene by scene and in script order, whether a shot reuses the
//! background of the previous committed scene or needs a new one.
//!
//! This crate provides:
//! - Extraction of background descriptions and keywords from scene text
//! - A similarity cascade (exact match, semantic rating, embeddings, token overlap)
//! - A per-job registry owning the background library, scene assignments
//!   and the inheritance chain

pub mod comparator;
pub mod config;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod registry;
pub mod services;

pub use comparator::{BackgroundComparator, BestMatch, ScoreSource, SimilarityScore, SIMILARITY_THRESHOLD};
pub use config::ContinuityConfig;
pub use error::{BackgroundInputError, ContinuityError, ContinuityResult};
pub use extractor::{
    create_unique_background, extract_keywords, find_matching_background, is_duplicate_background,
    normalize_background, validate_background_input, BackgroundExtractor, ExtractionSource,
};
pub use registry::{BackgroundRegistry, InheritanceChain};
pub use services::{BackgroundDescriber, Embedder, SimilarityRater};
