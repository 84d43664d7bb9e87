//! Per-job background registry and inheritance chain.
//!
//! The registry owns three pieces of state:
//! - the background library (candidates keyed by id)
//! - scene assignments (keyed by scene id)
//! - the inheritance chain, a single "committed background" slot
//!
//! Inheritance decisions always compare against the committed background,
//! never against the last decision. Inheriting leaves the slot untouched, so
//! a run of small changes can't walk the scene away from where it started.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use backdrop_models::{
    BackgroundCandidate, BackgroundId, BackgroundMetadata, RegistrySnapshot, SceneBackground,
};

use crate::comparator::{BackgroundComparator, SIMILARITY_THRESHOLD};
use crate::extractor::extract_keywords;
use crate::metrics;

/// Minimum loose keyword overlap for a default background lookup.
const DEFAULT_MATCH_THRESHOLD: f64 = 0.2;

/// State of the inheritance chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InheritanceChain {
    /// Start of a run; the next decision always mints a new background.
    #[default]
    NoPriorBackground,
    /// The background later scenes are compared against.
    HasCommittedBackground(BackgroundMetadata),
}

impl InheritanceChain {
    pub fn committed(&self) -> Option<&BackgroundMetadata> {
        match self {
            InheritanceChain::NoPriorBackground => None,
            InheritanceChain::HasCommittedBackground(metadata) => Some(metadata),
        }
    }
}

/// Background library, scene assignments and inheritance chain for one job.
pub struct BackgroundRegistry {
    backgrounds: HashMap<BackgroundId, BackgroundCandidate>,
    scene_backgrounds: HashMap<String, SceneBackground>,
    chain: InheritanceChain,
    comparator: Arc<BackgroundComparator>,
}

impl BackgroundRegistry {
    pub fn new(comparator: Arc<BackgroundComparator>) -> Self {
        Self {
            backgrounds: HashMap::new(),
            scene_backgrounds: HashMap::new(),
            chain: InheritanceChain::NoPriorBackground,
            comparator,
        }
    }

    /// Registry whose comparator needs no network.
    pub fn offline() -> Self {
        Self::new(Arc::new(BackgroundComparator::offline()))
    }

    // =========================================================================
    // Library
    // =========================================================================

    /// Replace the library wholesale.
    pub fn initialize_backgrounds(&mut self, candidates: Vec<BackgroundCandidate>) {
        self.backgrounds = candidates
            .into_iter()
            .map(|candidate| (candidate.id.clone(), candidate))
            .collect();
        debug!(count = self.backgrounds.len(), "Background library initialized");
    }

    /// Insert a candidate, overwriting any entry with the same id.
    pub fn add_background(&mut self, candidate: BackgroundCandidate) {
        self.backgrounds.insert(candidate.id.clone(), candidate);
    }

    /// Library entries, ordered by the first scene that references them.
    pub fn backgrounds(&self) -> Vec<&BackgroundCandidate> {
        let mut list: Vec<_> = self.backgrounds.values().collect();
        list.sort_by(|a, b| {
            let a_first = a.first_scene().unwrap_or(u32::MAX);
            let b_first = b.first_scene().unwrap_or(u32::MAX);
            a_first.cmp(&b_first).then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        list
    }

    pub fn background(&self, id: &BackgroundId) -> Option<&BackgroundCandidate> {
        self.backgrounds.get(id)
    }

    // =========================================================================
    // Scene assignments
    // =========================================================================

    /// Assign a background to a scene, overwriting any previous assignment.
    ///
    /// The description is resolved from the library; an id the library doesn't
    /// know leaves it empty.
    pub fn set_scene_background(
        &mut self,
        scene_id: impl Into<String>,
        scene_order: u32,
        background_id: Option<BackgroundId>,
        metadata: Option<BackgroundMetadata>,
    ) {
        let scene_id = scene_id.into();
        let selected_background_description = background_id
            .as_ref()
            .and_then(|id| self.backgrounds.get(id))
            .map(|candidate| candidate.description.clone());

        self.scene_backgrounds.insert(
            scene_id.clone(),
            SceneBackground {
                scene_id,
                scene_order,
                selected_background_id: background_id,
                selected_background_description,
                metadata,
            },
        );
    }

    pub fn scene_background(&self, scene_id: &str) -> Option<&SceneBackground> {
        self.scene_backgrounds.get(scene_id)
    }

    /// Description of the library entry assigned to a scene.
    pub fn scene_background_description(&self, scene_id: &str) -> Option<&str> {
        self.scene_backgrounds
            .get(scene_id)
            .and_then(|assignment| assignment.selected_background_description.as_deref())
    }

    // =========================================================================
    // Inheritance chain
    // =========================================================================

    /// Decide whether the current scene reuses the committed background.
    ///
    /// Must be called once per scene in ascending script order. `&mut self`
    /// keeps a single decision in flight per registry.
    pub async fn decide_inheritance(&mut self, description: &str, threshold: f64) -> BackgroundMetadata {
        let committed = match &self.chain {
            InheritanceChain::NoPriorBackground => {
                let metadata = BackgroundMetadata::fresh(description, extract_keywords(description));
                info!(
                    background_id = %metadata.id,
                    inherited = false,
                    "First background in chain"
                );
                return self.commit(metadata);
            }
            InheritanceChain::HasCommittedBackground(committed) => committed,
        };

        let score = self
            .comparator
            .compare_backgrounds(&committed.description, description)
            .await;
        let inherit = score >= threshold;

        info!(
            prev = %preview(&committed.description),
            curr = %preview(description),
            score = %format!("{:.3}", score),
            threshold,
            inherited = inherit,
            "Inheritance decision"
        );

        if inherit {
            metrics::record_decision(true);
            return BackgroundMetadata::inherit(committed);
        }

        self.commit(BackgroundMetadata::fresh(description, extract_keywords(description)))
    }

    /// [`decide_inheritance`](Self::decide_inheritance) at the default threshold.
    pub async fn decide_inheritance_default(&mut self, description: &str) -> BackgroundMetadata {
        self.decide_inheritance(description, SIMILARITY_THRESHOLD).await
    }

    fn commit(&mut self, metadata: BackgroundMetadata) -> BackgroundMetadata {
        metrics::record_decision(false);
        self.chain = InheritanceChain::HasCommittedBackground(metadata.clone());
        metadata
    }

    /// The background later scenes are compared against, if any.
    pub fn committed_background(&self) -> Option<&BackgroundMetadata> {
        self.chain.committed()
    }

    /// Start a new chain; the next decision mints a new background.
    pub fn reset_inheritance_chain(&mut self) {
        self.chain = InheritanceChain::NoPriorBackground;
    }

    // =========================================================================
    // Lookup and persistence
    // =========================================================================

    /// Best-effort default background for a scene, outside the inheritance flow.
    ///
    /// Tries the explicit assignment, then a candidate already attributed to
    /// `scene_order`, then a loose keyword overlap with `description`.
    pub fn default_background_for_scene(
        &self,
        scene_id: &str,
        scene_order: u32,
        description: Option<&str>,
    ) -> Option<&BackgroundCandidate> {
        if let Some(id) = self
            .scene_backgrounds
            .get(scene_id)
            .and_then(|assignment| assignment.selected_background_id.as_ref())
        {
            return self.backgrounds.get(id);
        }

        let ordered = self.backgrounds();
        if let Some(candidate) = ordered.iter().find(|c| c.covers_scene(scene_order)) {
            return Some(candidate);
        }

        let description = description?.to_lowercase();
        let words: Vec<&str> = description.split_whitespace().collect();
        if words.is_empty() {
            return None;
        }

        let mut best: Option<(&BackgroundCandidate, f64)> = None;
        for candidate in ordered {
            let matches = words
                .iter()
                .filter(|word| {
                    candidate
                        .keywords
                        .iter()
                        .any(|keyword| keyword.contains(*word) || word.contains(keyword.as_str()))
                })
                .count();
            let score = matches as f64 / words.len() as f64;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }

        best.filter(|(_, score)| *score > DEFAULT_MATCH_THRESHOLD)
            .map(|(candidate, _)| candidate)
    }

    /// Snapshot of the library and scene assignments.
    ///
    /// The inheritance chain is not included.
    pub fn export(&self) -> RegistrySnapshot {
        let backgrounds = self.backgrounds().into_iter().cloned().collect();

        let mut scene_backgrounds: Vec<SceneBackground> =
            self.scene_backgrounds.values().cloned().collect();
        scene_backgrounds.sort_by(|a, b| {
            a.scene_order
                .cmp(&b.scene_order)
                .then_with(|| a.scene_id.cmp(&b.scene_id))
        });

        RegistrySnapshot {
            backgrounds,
            scene_backgrounds,
        }
    }

    /// Replace the library and scene assignments; the chain is left as is.
    pub fn import(&mut self, snapshot: RegistrySnapshot) {
        self.initialize_backgrounds(snapshot.backgrounds);
        self.scene_backgrounds = snapshot
            .scene_backgrounds
            .into_iter()
            .map(|assignment| (assignment.scene_id.clone(), assignment))
            .collect();
    }

    /// Wipe the library, the scene assignments and the chain.
    pub fn clear(&mut self) {
        self.backgrounds.clear();
        self.scene_backgrounds.clear();
        self.chain = InheritanceChain::NoPriorBackground;
    }
}

impl Default for BackgroundRegistry {
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
