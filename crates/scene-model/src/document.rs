//! Persisted scene document (`scenes.json`).
//!
//! The document is a flat description of every scene and its sources plus
//! the id of the current scene. Live capture and decoder handles are never
//! part of it; they are rebuilt by the render engine on load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::scene::SceneDef;

/// Current document schema version.
pub const DOCUMENT_VERSION: &str = "1.0";

/// Top-level scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Last save timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,

    /// All scenes in creation order.
    #[serde(default)]
    pub scenes: Vec<SceneDef>,

    /// Id of the current scene, if any.
    #[serde(default)]
    pub current_scene_id: Option<String>,
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            saved_at: None,
            scenes: Vec::new(),
            current_scene_id: None,
        }
    }
}

impl SceneDocument {
    /// Load and validate a document. A missing file yields an empty document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneDocumentError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No scene document, starting empty");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path).map_err(|e| SceneDocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let document: SceneDocument =
            serde_json::from_str(&json).map_err(|e| SceneDocumentError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        document.validate()?;
        Ok(document)
    }

    /// Stamp `saved_at` and write the document as pretty JSON.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), SceneDocumentError> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SceneDocumentError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.saved_at = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(self).map_err(|e| SceneDocumentError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        std::fs::write(path, json).map_err(|e| SceneDocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check structural invariants: unique ids, non-empty destination boxes,
    /// and at most one active scene.
    pub fn validate(&self) -> Result<(), SceneDocumentError> {
        let mut scene_ids = HashSet::new();
        let mut source_ids = HashSet::new();
        let mut active = 0usize;

        for scene in &self.scenes {
            if !scene_ids.insert(scene.id.as_str()) {
                return Err(SceneDocumentError::validation(format!(
                    "duplicate scene id: {}",
                    scene.id
                )));
            }
            if scene.active {
                active += 1;
            }

            for source in &scene.sources {
                if !source_ids.insert(source.id.as_str()) {
                    return Err(SceneDocumentError::validation(format!(
                        "duplicate source id: {}",
                        source.id
                    )));
                }
                if source.size.0 == 0 || source.size.1 == 0 {
                    return Err(SceneDocumentError::validation(format!(
                        "source {} has an empty size {:?}",
                        source.id, source.size
                    )));
                }
            }
        }

        if active > 1 {
            return Err(SceneDocumentError::validation(format!(
                "{active} scenes are marked active"
            )));
        }

        Ok(())
    }

    pub fn scene(&self, scene_id: &str) -> Option<&SceneDef> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }
}

/// Errors that can occur when reading or writing scene documents.
#[derive(Debug, thiserror::Error)]
pub enum SceneDocumentError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid scene document: {message}")]
    ValidationError { message: String },
}

impl SceneDocumentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError {
            message: msg.into(),
        }
    }
}
