//! Source editing within a scene.

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Subcommand;
use scenecast_common::config::AppConfig;

use super::open_editor;

#[derive(Subcommand)]
pub enum SourceCommand {
    /// Add a source on top of a scene
    Add {
        /// Scene id
        scene: String,

        /// Source kind: screen, window, image, video, browser or camera
        kind: String,

        /// Display name
        name: String,

        /// Kind-specific property as key=value (repeatable). Values that
        /// parse as JSON are stored as JSON, e.g. region=[0,0,1280,720]
        #[arg(long = "prop", value_parser = parse_property)]
        properties: Vec<(String, serde_json::Value)>,

        /// Top-left corner as X,Y
        #[arg(long, value_parser = parse_position)]
        position: Option<(u32, u32)>,

        /// Destination box as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        size: Option<(u32, u32)>,
    },

    /// Remove a source
    Remove { scene: String, id: String },

    /// Move a source one step toward the back
    Up { scene: String, id: String },

    /// Move a source one step toward the front
    Down { scene: String, id: String },

    /// Show or hide a source
    Toggle { scene: String, id: String },

    /// Change a source's position and/or size
    Move {
        scene: String,
        id: String,

        /// Top-left corner as X,Y
        #[arg(long, value_parser = parse_position)]
        position: Option<(u32, u32)>,

        /// Destination box as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        size: Option<(u32, u32)>,
    },
}

pub fn run(config: &AppConfig, command: SourceCommand) -> anyhow::Result<()> {
    let mut manager = open_editor(config)?;

    match command {
        SourceCommand::Add {
            scene,
            kind,
            name,
            properties,
            position,
            size,
        } => {
            let properties: BTreeMap<_, _> = properties.into_iter().collect();
            let id = manager.add_source(&scene, &kind, &name, properties)?;
            if position.is_some() || size.is_some() {
                set_geometry(&mut manager, &scene, &id, position, size)?;
            }
            println!("Added {id} to {scene}");
        }
        SourceCommand::Remove { scene, id } => {
            manager.remove_source(&scene, &id)?;
            println!("Removed {id}");
        }
        SourceCommand::Up { scene, id } => {
            if !manager.move_source_up(&scene, &id)? {
                println!("{id} is already at the back");
            }
        }
        SourceCommand::Down { scene, id } => {
            if !manager.move_source_down(&scene, &id)? {
                println!("{id} is already at the front");
            }
        }
        SourceCommand::Toggle { scene, id } => {
            let visible = manager.toggle_source_visible(&scene, &id)?;
            println!("{id} is now {}", if visible { "visible" } else { "hidden" });
        }
        SourceCommand::Move {
            scene,
            id,
            position,
            size,
        } => set_geometry(&mut manager, &scene, &id, position, size)?,
    }

    manager.save(&config.scenes_path)?;
    Ok(())
}

fn set_geometry(
    manager: &mut scenecast_render_engine::SceneManager,
    scene: &str,
    id: &str,
    position: Option<(u32, u32)>,
    size: Option<(u32, u32)>,
) -> anyhow::Result<()> {
    let current = manager
        .layout(scene)?
        .into_iter()
        .find(|layout| layout.id == id)
        .with_context(|| format!("source not found: {id}"))?;
    manager.set_source_geometry(
        scene,
        id,
        position.unwrap_or(current.position),
        size.unwrap_or(current.size),
    )?;
    Ok(())
}

fn parse_property(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_pair(raw: &str, separator: char, what: &str) -> Result<(u32, u32), String> {
    let (a, b) = raw
        .split_once(separator)
        .ok_or_else(|| format!("expected {what}, got '{raw}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid number '{s}': {e}"))
    };
    Ok((parse(a)?, parse(b)?))
}

fn parse_position(raw: &str) -> Result<(u32, u32), String> {
    parse_pair(raw, ',', "X,Y")
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let size = parse_pair(&raw.to_ascii_lowercase(), 'x', "WIDTHxHEIGHT")?;
    if size.0 == 0 || size.1 == 0 {
        return Err(format!("size must be positive, got '{raw}'"));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_values_prefer_json() {
        assert_eq!(
            parse_property("display=1").unwrap(),
            ("display".to_string(), serde_json::json!(1))
        );
        assert_eq!(
            parse_property("region=[0,0,640,480]").unwrap().1,
            serde_json::json!([0, 0, 640, 480])
        );
        assert_eq!(
            parse_property("file=/tmp/logo.png").unwrap().1,
            serde_json::json!("/tmp/logo.png")
        );
        assert!(parse_property("novalue").is_err());
    }

    #[test]
    fn geometry_arguments() {
        assert_eq!(parse_position("10,20"), Ok((10, 20)));
        assert_eq!(parse_size("1280X720"), Ok((1280, 720)));
        assert!(parse_size("0x720").is_err());
        assert!(parse_position("10;20").is_err());
    }
}
