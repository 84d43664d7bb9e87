//! Registry snapshot exchanged with the persistence layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BackgroundCandidate, SceneBackground};

/// Serializable registry state.
///
/// Only the library and the scene assignments are persisted. The inheritance
/// chain belongs to a single processing run and is never part of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub backgrounds: Vec<BackgroundCandidate>,

    #[serde(default)]
    pub scene_backgrounds: Vec<SceneBackground>,
}

impl RegistrySnapshot {
    pub fn is_empty(&self) -> bool {
        self.backgrounds.is_empty() && self.scene_backgrounds.is_empty()
    }
}
