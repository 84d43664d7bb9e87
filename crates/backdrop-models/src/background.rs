//! Background library models.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a background asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BackgroundId(pub String);

impl BackgroundId {
    /// Generate a new random background ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BackgroundId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackgroundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BackgroundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A distinct background known to the current project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundCandidate {
    /// Unique ID, assigned at creation and never reused
    pub id: BackgroundId,

    /// Human-readable location label
    pub description: String,

    /// Lowercase content words of the description (unique, first-seen order)
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Script orders of the scenes attributed to this background
    #[serde(default)]
    pub scene_indices: Vec<u32>,
}

impl BackgroundCandidate {
    /// Create a candidate with a fresh ID and no attributed scenes.
    pub fn new(description: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            id: BackgroundId::new(),
            description: description.into(),
            keywords,
            scene_indices: Vec::new(),
        }
    }

    /// Attribute a scene to this background.
    ///
    /// `scene_indices` is an ordered set, so an order that is already
    /// present is ignored.
    pub fn attach_scene(&mut self, scene_order: u32) {
        if !self.scene_indices.contains(&scene_order) {
            self.scene_indices.push(scene_order);
        }
    }

    /// Builder-style variant of [`attach_scene`](Self::attach_scene).
    pub fn with_scene(mut self, scene_order: u32) -> Self {
        self.attach_scene(scene_order);
        self
    }

    /// Whether the given scene order is attributed to this background.
    pub fn covers_scene(&self, scene_order: u32) -> bool {
        self.scene_indices.contains(&scene_order)
    }

    /// Lowest attributed scene order, if any.
    pub fn first_scene(&self) -> Option<u32> {
        self.scene_indices.iter().copied().min()
    }
}
