//! Shared data models for the Backdrop continuity engine.
//!
//! This crate provides Serde-serializable types for:
//! - Background candidates (the per-project background library)
//! - Scene inputs handed over by the script segmenter
//! - Per-scene background assignments and inheritance decisions
//! - Registry snapshots exchanged with the persistence layer

pub mod background;
pub mod metadata;
pub mod scene;
pub mod snapshot;

// Re-export common types
pub use background::{BackgroundCandidate, BackgroundId};
pub use metadata::BackgroundMetadata;
pub use scene::{SceneBackground, SceneInput};
pub use snapshot::RegistrySnapshot;
