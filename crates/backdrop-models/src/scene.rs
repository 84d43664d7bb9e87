//! Scene-level models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BackgroundId, BackgroundMetadata};

/// A segmented scene block as produced by the script parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneInput {
    /// Position of the scene in the script
    pub order: u32,

    /// Stable scene identifier (defaults to `scene-{order}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,

    /// Explicit background written in the script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    /// Shot description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_description: Option<String>,

    /// Raw scene text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl SceneInput {
    /// Create an empty scene at the given order.
    pub fn new(order: u32) -> Self {
        Self {
            order,
            ..Default::default()
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = Some(background.into());
        self
    }

    pub fn with_shot_description(mut self, shot_description: impl Into<String>) -> Self {
        self.shot_description = Some(shot_description.into());
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn with_scene_id(mut self, scene_id: impl Into<String>) -> Self {
        self.scene_id = Some(scene_id.into());
        self
    }

    /// Scene identifier used for assignments.
    pub fn scene_key(&self) -> String {
        self.scene_id
            .clone()
            .unwrap_or_else(|| format!("scene-{}", self.order))
    }

    /// Free text the describer should read: the shot description, else the raw text.
    pub fn scene_text(&self) -> Option<&str> {
        self.shot_description
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.raw.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

/// Background assignment for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SceneBackground {
    pub scene_id: String,

    pub scene_order: u32,

    /// Library entry backing this scene (`None` for free text)
    pub selected_background_id: Option<BackgroundId>,

    /// Description of the library entry
    pub selected_background_description: Option<String>,

    /// Inheritance decision that produced this assignment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BackgroundMetadata>,
}
