//! Runtime scene graph.
//!
//! The manager owns every live scene and, through them, every source's
//! provider and last-good-frame cache. Mutations that fail validation leave
//! the graph untouched.

use std::collections::BTreeMap;
use std::path::Path;

use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_scene_model::{SceneDef, SceneDocument, SourceDef, SourceKind};
use serde::Serialize;

use crate::source::{LiveSource, ProviderContext};

/// A scene with live sources, back-to-front.
pub struct LiveScene {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub sources: Vec<LiveSource>,
}

impl LiveScene {
    pub fn source(&self, source_id: &str) -> Option<&LiveSource> {
        self.sources.iter().find(|s| s.id() == source_id)
    }

    fn source_index(&self, source_id: &str) -> ScenecastResult<usize> {
        self.sources
            .iter()
            .position(|s| s.id() == source_id)
            .ok_or_else(|| ScenecastError::not_found("source", source_id))
    }

    fn to_def(&self) -> SceneDef {
        SceneDef {
            id: self.id.clone(),
            name: self.name.clone(),
            active: self.active,
            sources: self.sources.iter().map(|s| s.def().clone()).collect(),
        }
    }

    fn suspend(&mut self) {
        for source in &mut self.sources {
            source.suspend();
        }
    }

    fn release(&mut self) {
        for source in &mut self.sources {
            source.release();
        }
    }
}

/// Placement of one source, for presentation overlays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLayout {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub visible: bool,
    pub position: (u32, u32),
    pub size: (u32, u32),
}

/// Owner of all scenes and the current-scene pointer.
pub struct SceneManager {
    ctx: ProviderContext,
    scenes: Vec<LiveScene>,
    current: Option<String>,
    next_scene: u64,
}

impl SceneManager {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            scenes: Vec::new(),
            current: None,
            next_scene: 0,
        }
    }

    /// Rebuild live scenes from a document, starting every provider.
    pub fn from_document(document: SceneDocument, ctx: ProviderContext) -> ScenecastResult<Self> {
        document
            .validate()
            .map_err(|e| ScenecastError::scene(e.to_string()))?;

        let mut manager = Self::new(ctx);
        for scene in document.scenes {
            let sources = scene
                .sources
                .into_iter()
                .map(|def| LiveSource::new(def, &manager.ctx))
                .collect();
            manager.scenes.push(LiveScene {
                id: scene.id,
                name: scene.name,
                active: false,
                sources,
            });
        }
        manager.next_scene = manager
            .scenes
            .iter()
            .filter_map(|s| s.id.strip_prefix("scene_")?.parse::<u64>().ok())
            .map(|n| n + 1)
            .max()
            .unwrap_or(0)
            .max(manager.scenes.len() as u64);

        match document.current_scene_id {
            Some(id) if manager.scene(&id).is_some() => manager.set_active_scene(&id)?,
            Some(id) => tracing::warn!(scene_id = %id, "Current scene missing from document"),
            None => {}
        }

        tracing::info!(
            scenes = manager.scenes.len(),
            current = ?manager.current,
            "Scene graph loaded"
        );
        Ok(manager)
    }

    /// Flatten to a persistable document.
    pub fn to_document(&self) -> SceneDocument {
        SceneDocument {
            scenes: self.scenes.iter().map(LiveScene::to_def).collect(),
            current_scene_id: self.current.clone(),
            ..SceneDocument::default()
        }
    }

    /// Load from a scene document file (empty when the file is missing).
    pub fn load(path: impl AsRef<Path>, ctx: ProviderContext) -> ScenecastResult<Self> {
        let document =
            SceneDocument::load(path).map_err(|e| ScenecastError::scene(e.to_string()))?;
        Self::from_document(document, ctx)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ScenecastResult<()> {
        let path = path.as_ref();
        self.to_document()
            .save(path)
            .map_err(|e| ScenecastError::scene(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Scene graph saved");
        Ok(())
    }

    pub fn scenes(&self) -> &[LiveScene] {
        &self.scenes
    }

    pub fn scene(&self, scene_id: &str) -> Option<&LiveScene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    pub fn scene_mut(&mut self, scene_id: &str) -> Option<&mut LiveScene> {
        self.scenes.iter_mut().find(|s| s.id == scene_id)
    }

    fn require_scene_mut(&mut self, scene_id: &str) -> ScenecastResult<&mut LiveScene> {
        self.scene_mut(scene_id)
            .ok_or_else(|| ScenecastError::not_found("scene", scene_id))
    }

    pub fn current_scene_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_scene(&self) -> Option<&LiveScene> {
        self.scene(self.current.as_deref()?)
    }

    pub fn current_scene_mut(&mut self) -> Option<&mut LiveScene> {
        let id = self.current.clone()?;
        self.scene_mut(&id)
    }

    /// Create an empty scene and return its id.
    pub fn create_scene(&mut self, name: impl Into<String>) -> String {
        let mut id = format!("scene_{}", self.next_scene);
        while self.scene(&id).is_some() {
            self.next_scene += 1;
            id = format!("scene_{}", self.next_scene);
        }
        self.next_scene += 1;

        let name = name.into();
        tracing::info!(scene_id = %id, name = %name, "Scene created");
        self.scenes.push(LiveScene {
            id: id.clone(),
            name,
            active: false,
            sources: Vec::new(),
        });
        id
    }

    /// Delete a scene, releasing its sources' providers.
    pub fn delete_scene(&mut self, scene_id: &str) -> ScenecastResult<()> {
        let index = self
            .scenes
            .iter()
            .position(|s| s.id == scene_id)
            .ok_or_else(|| ScenecastError::not_found("scene", scene_id))?;

        let mut scene = self.scenes.remove(index);
        scene.release();
        if self.current.as_deref() == Some(scene_id) {
            self.current = None;
        }
        tracing::info!(scene_id, "Scene deleted");
        Ok(())
    }

    /// Mark one scene active and current; every other scene inactive with
    /// its grabs suspended.
    pub fn set_active_scene(&mut self, scene_id: &str) -> ScenecastResult<()> {
        if self.scene(scene_id).is_none() {
            return Err(ScenecastError::not_found("scene", scene_id));
        }
        for scene in &mut self.scenes {
            scene.active = scene.id == scene_id;
            if !scene.active {
                scene.suspend();
            }
        }
        self.current = Some(scene_id.to_string());
        tracing::debug!(scene_id, "Scene activated");
        Ok(())
    }

    /// Add a source on top of a scene and return its id.
    pub fn add_source(
        &mut self,
        scene_id: &str,
        kind: &str,
        name: &str,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> ScenecastResult<String> {
        let kind: SourceKind = kind
            .parse()
            .map_err(|e: scenecast_scene_model::UnknownSourceKind| {
                ScenecastError::config(e.to_string())
            })?;
        if self.scene(scene_id).is_none() {
            return Err(ScenecastError::not_found("scene", scene_id));
        }

        let id = self.unique_source_id(kind, name);
        let source = LiveSource::new(SourceDef::new(id.clone(), name, kind, properties), &self.ctx);
        self.require_scene_mut(scene_id)?.sources.push(source);

        tracing::info!(scene_id, source_id = %id, %kind, "Source added");
        Ok(id)
    }

    /// Remove a source, releasing its provider.
    pub fn remove_source(&mut self, scene_id: &str, source_id: &str) -> ScenecastResult<()> {
        let scene = self.require_scene_mut(scene_id)?;
        let index = scene.source_index(source_id)?;
        let mut source = scene.sources.remove(index);
        source.release();
        tracing::info!(scene_id, source_id, "Source removed");
        Ok(())
    }

    /// Move a source one step toward the back. Returns whether it moved.
    pub fn move_source_up(&mut self, scene_id: &str, source_id: &str) -> ScenecastResult<bool> {
        let scene = self.require_scene_mut(scene_id)?;
        let index = scene.source_index(source_id)?;
        if index == 0 {
            return Ok(false);
        }
        scene.sources.swap(index - 1, index);
        Ok(true)
    }

    /// Move a source one step toward the front. Returns whether it moved.
    pub fn move_source_down(&mut self, scene_id: &str, source_id: &str) -> ScenecastResult<bool> {
        let scene = self.require_scene_mut(scene_id)?;
        let index = scene.source_index(source_id)?;
        if index + 1 >= scene.sources.len() {
            return Ok(false);
        }
        scene.sources.swap(index, index + 1);
        Ok(true)
    }

    pub fn set_source_visible(
        &mut self,
        scene_id: &str,
        source_id: &str,
        visible: bool,
    ) -> ScenecastResult<()> {
        let scene = self.require_scene_mut(scene_id)?;
        let index = scene.source_index(source_id)?;
        let source = &mut scene.sources[index];
        source.def_mut().visible = visible;
        if !visible {
            source.suspend();
        }
        Ok(())
    }

    /// Flip visibility and return the new state.
    pub fn toggle_source_visible(
        &mut self,
        scene_id: &str,
        source_id: &str,
    ) -> ScenecastResult<bool> {
        let scene = self.require_scene_mut(scene_id)?;
        let index = scene.source_index(source_id)?;
        let visible = !scene.sources[index].is_visible();
        self.set_source_visible(scene_id, source_id, visible)?;
        Ok(visible)
    }

    /// Place a source's destination box. Both sides of `size` must be positive.
    pub fn set_source_geometry(
        &mut self,
        scene_id: &str,
        source_id: &str,
        position: (u32, u32),
        size: (u32, u32),
    ) -> ScenecastResult<()> {
        if size.0 == 0 || size.1 == 0 {
            return Err(ScenecastError::config(format!(
                "source size must be positive, got {}x{}",
                size.0, size.1
            )));
        }
        let scene = self.require_scene_mut(scene_id)?;
        let index = scene.source_index(source_id)?;
        let def = scene.sources[index].def_mut();
        def.position = position;
        def.size = size;
        Ok(())
    }

    /// Ordered source placement for a scene.
    pub fn layout(&self, scene_id: &str) -> ScenecastResult<Vec<SourceLayout>> {
        let scene = self
            .scene(scene_id)
            .ok_or_else(|| ScenecastError::not_found("scene", scene_id))?;
        Ok(scene
            .sources
            .iter()
            .map(|s| {
                let def = s.def();
                SourceLayout {
                    id: def.id.clone(),
                    name: def.name.clone(),
                    kind: def.kind,
                    visible: def.visible,
                    position: def.position,
                    size: def.size,
                }
            })
            .collect())
    }

    /// `<kind>_<name>`, suffixed `_<n>` when already taken in any scene.
    fn unique_source_id(&self, kind: SourceKind, name: &str) -> String {
        let base = format!("{kind}_{name}");
        let taken = |id: &str| {
            self.scenes
                .iter()
                .any(|scene| scene.sources.iter().any(|s| s.id() == id))
        };
        if !taken(&base) {
            return base;
        }
        (2u64..)
            .map(|n| format!("{base}_{n}"))
            .find(|id| !taken(id))
            .unwrap_or(base)
    }
}

impl Drop for SceneManager {
    fn drop(&mut self) {
        for scene in &mut self.scenes {
            scene.release();
        }
    }
}
