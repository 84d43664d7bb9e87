//! Inheritance decision records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::BackgroundId;

/// The background decision for one scene.
///
/// Produced once per scene by the inheritance chain. When `is_inherited` is
/// set, `id` is the ID of the committed background the scene reuses and
/// `inherited_from` carries the same ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundMetadata {
    /// Background this scene uses
    pub id: BackgroundId,

    /// Description of the resolved background
    pub description: String,

    /// Keywords of the resolved background
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Whether the scene reuses the committed background
    pub is_inherited: bool,

    /// Committed background the scene inherits from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<BackgroundId>,
}

impl BackgroundMetadata {
    /// A new, non-inherited background with a freshly minted ID.
    pub fn fresh(description: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            id: BackgroundId::new(),
            description: description.into(),
            keywords,
            is_inherited: false,
            inherited_from: None,
        }
    }

    /// A record that reuses `committed` verbatim.
    ///
    /// Description and keywords are copied from the committed background,
    /// never from the scene that triggered the decision.
    pub fn inherit(committed: &BackgroundMetadata) -> Self {
        Self {
            id: committed.id.clone(),
            description: committed.description.clone(),
            keywords: committed.keywords.clone(),
            is_inherited: true,
            inherited_from: Some(committed.id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherit_copies_committed() {
        let committed = BackgroundMetadata::fresh("Old library", vec!["old".into(), "library".into()]);
        let inherited = BackgroundMetadata::inherit(&committed);

        assert!(inherited.is_inherited);
        assert_eq!(inherited.id, committed.id);
        assert_eq!(inherited.inherited_from.as_ref(), Some(&committed.id));
        assert_eq!(inherited.description, "Old library");
        assert_eq!(inherited.keywords, committed.keywords);
    }

    #[test]
    fn test_fresh_omits_inherited_from() {
        let fresh = BackgroundMetadata::fresh("Beach", vec!["beach".into()]);
        let json = serde_json::to_value(&fresh).unwrap();

        assert_eq!(json["isInherited"], false);
        assert!(json.get("inheritedFrom").is_none());
    }
}
