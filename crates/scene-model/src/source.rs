//! Source definitions.
//!
//! A source is one visual origin placed on the canvas. Its kind-specific
//! configuration lives in a free-form `properties` map so that documents
//! written by other tools keep unknown keys intact.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use scenecast_platform_core::Rect;
use serde::{Deserialize, Serialize};

/// Property key holding a media file path (image and video sources).
pub const PROP_FILE: &str = "file";
/// Property key holding a browser source URL.
pub const PROP_URL: &str = "url";
/// Property key holding the window title to match (window sources).
pub const PROP_WINDOW_TITLE: &str = "window_title";
/// Property key holding an optional `[x, y, width, height]` grab region.
pub const PROP_REGION: &str = "region";
/// Property key holding the display index (screen sources).
pub const PROP_DISPLAY: &str = "display";

/// Default destination box: the whole default canvas.
pub const DEFAULT_SOURCE_SIZE: (u32, u32) = (1920, 1080);

/// The closed set of source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Full screen or a fixed region of it.
    Screen,
    /// A window matched by title.
    Window,
    /// A still image file.
    Image,
    /// A looping video file.
    Video,
    /// URL placeholder (no live page rendering).
    Browser,
    /// Reserved; produces no frames.
    Camera,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Screen,
        SourceKind::Window,
        SourceKind::Image,
        SourceKind::Video,
        SourceKind::Browser,
        SourceKind::Camera,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Screen => "screen",
            SourceKind::Window => "window",
            SourceKind::Image => "image",
            SourceKind::Video => "video",
            SourceKind::Browser => "browser",
            SourceKind::Camera => "camera",
        }
    }

    /// Whether the kind owns a live capture handle.
    pub fn is_capture(&self) -> bool {
        matches!(self, SourceKind::Screen | SourceKind::Window)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown source kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown source type: {0}")]
pub struct UnknownSourceKind(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownSourceKind(s.to_string()))
    }
}

/// Persisted definition of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDef {
    /// Unique id within the scene collection (`<kind>_<name>`).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Source kind.
    #[serde(rename = "type")]
    pub kind: SourceKind,

    /// Kind-specific configuration.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,

    #[serde(default = "default_visible")]
    pub visible: bool,

    /// Top-left corner of the destination box on the canvas.
    #[serde(default)]
    pub position: (u32, u32),

    /// Destination box size; both sides positive.
    #[serde(default = "default_size")]
    pub size: (u32, u32),
}

fn default_visible() -> bool {
    true
}

fn default_size() -> (u32, u32) {
    DEFAULT_SOURCE_SIZE
}

impl SourceDef {
    /// Create a visible source covering the default canvas.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: SourceKind,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            properties,
            visible: true,
            position: (0, 0),
            size: DEFAULT_SOURCE_SIZE,
        }
    }

    /// Read a string property.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn file(&self) -> Option<&str> {
        self.property_str(PROP_FILE)
    }

    pub fn url(&self) -> Option<&str> {
        self.property_str(PROP_URL)
    }

    pub fn window_title(&self) -> Option<&str> {
        self.property_str(PROP_WINDOW_TITLE)
    }

    /// Grab region from `[x, y, width, height]` or `{x, y, width, height}`.
    pub fn region(&self) -> Option<Rect> {
        let value = self.properties.get(PROP_REGION)?;
        if let Some(items) = value.as_array() {
            if items.len() != 4 {
                return None;
            }
            let x = items[0].as_i64()?;
            let y = items[1].as_i64()?;
            let width = items[2].as_u64()?;
            let height = items[3].as_u64()?;
            return Some(Rect::new(
                i32::try_from(x).ok()?,
                i32::try_from(y).ok()?,
                u32::try_from(width).ok()?,
                u32::try_from(height).ok()?,
            ));
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Destination box as a rectangle on the canvas.
    pub fn dest_rect(&self) -> Rect {
        Rect::new(
            self.position.0 as i32,
            self.position.1 as i32,
            self.size.0,
            self.size.1,
        )
    }
}
