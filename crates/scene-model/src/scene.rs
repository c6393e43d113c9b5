//! Scene definitions.

use serde::{Deserialize, Serialize};

use crate::source::SourceDef;

/// Persisted definition of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDef {
    /// Unique id (`scene_<n>`).
    pub id: String,

    pub name: String,

    /// Whether this is the scene rendered by default.
    #[serde(default)]
    pub active: bool,

    /// Sources in back-to-front order.
    #[serde(default)]
    pub sources: Vec<SourceDef>,
}

impl SceneDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: false,
            sources: Vec::new(),
        }
    }

    /// Position of a source in the z-order.
    pub fn source_index(&self, source_id: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.id == source_id)
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceDef> {
        self.sources.iter().find(|s| s.id == source_id)
    }
}
