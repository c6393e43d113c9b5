//! Scene collection editing.

use clap::Subcommand;
use scenecast_common::config::AppConfig;

use super::open_editor;

#[derive(Subcommand)]
pub enum SceneCommand {
    /// List scenes and their sources
    List {
        /// Print the scene layout as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an empty scene
    Create {
        /// Scene name
        name: String,

        /// Make the new scene current
        #[arg(long)]
        activate: bool,
    },

    /// Delete a scene and its sources
    Delete {
        /// Scene id
        id: String,
    },

    /// Make a scene current
    Activate {
        /// Scene id
        id: String,
    },
}

pub fn run(config: &AppConfig, command: SceneCommand) -> anyhow::Result<()> {
    let mut manager = open_editor(config)?;

    match command {
        SceneCommand::List { json } => {
            if json {
                let scenes = manager
                    .scenes()
                    .iter()
                    .map(|scene| -> anyhow::Result<serde_json::Value> {
                        Ok(serde_json::json!({
                            "id": scene.id,
                            "name": scene.name,
                            "active": scene.active,
                            "sources": manager.layout(&scene.id)?,
                        }))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&scenes)?);
                return Ok(());
            }

            if manager.scenes().is_empty() {
                println!("No scenes in {}", config.scenes_path.display());
                return Ok(());
            }
            for scene in manager.scenes() {
                let marker = if scene.active { "*" } else { " " };
                println!("{marker} {} ({})", scene.id, scene.name);
                for layout in manager.layout(&scene.id)? {
                    println!(
                        "    {:<24} {:<8} {}x{} @ {},{}{}",
                        layout.id,
                        layout.kind.as_str(),
                        layout.size.0,
                        layout.size.1,
                        layout.position.0,
                        layout.position.1,
                        if layout.visible { "" } else { " (hidden)" }
                    );
                }
            }
            return Ok(());
        }
        SceneCommand::Create { name, activate } => {
            let id = manager.create_scene(&name);
            if activate || manager.current_scene_id().is_none() {
                manager.set_active_scene(&id)?;
            }
            println!("Created scene {id} ({name})");
        }
        SceneCommand::Delete { id } => {
            manager.delete_scene(&id)?;
            println!("Deleted scene {id}");
        }
        SceneCommand::Activate { id } => {
            manager.set_active_scene(&id)?;
            println!("Current scene: {id}");
        }
    }

    manager.save(&config.scenes_path)?;
    Ok(())
}
