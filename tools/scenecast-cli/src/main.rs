//! SceneCast command-line interface: scene editing, snapshots, streaming
//! and recording.
//!
//! Usage:
//!   scenecast run [OPTIONS]          Tick the compositor, optionally streaming or recording
//!   scenecast snapshot <FILE>        Render a scene to an image file
//!   scenecast scene <COMMAND>        List, create, delete or activate scenes
//!   scenecast source <COMMAND>       Add, remove, reorder, toggle or move sources
//!   scenecast windows                List capturable windows
//!   scenecast displays               List connected displays
//!   scenecast check                  Check system capabilities

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use scenecast_render_engine::Transition;
use scenecast_stream_engine::StreamTarget;

mod commands;

use commands::scene::SceneCommand;
use commands::source::SourceCommand;

#[derive(Parser)]
#[command(
    name = "scenecast",
    about = "Scene compositor with live streaming and recording",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scene document, overriding the configured path
    #[arg(long, global = true)]
    scenes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tick the compositor at the canvas frame rate
    Run {
        /// Scene to start on (defaults to the current scene)
        #[arg(long)]
        scene: Option<String>,

        /// Publish URL, e.g. rtmp://live.example.com/app
        #[arg(long)]
        stream_url: Option<String>,

        /// Stream key appended to the publish URL
        #[arg(long, requires = "stream_url")]
        stream_key: Option<String>,

        /// Record to a local file instead of publishing
        #[arg(long, conflicts_with = "stream_url")]
        record: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Switch to the next scene every N seconds
        #[arg(long)]
        cycle_secs: Option<f64>,

        /// Transition used when cycling scenes
        #[arg(long, value_enum, default_value = "cut")]
        transition: TransitionArg,
    },

    /// Render a scene to an image file
    Snapshot {
        /// Output image path (format from extension)
        output: PathBuf,

        /// Scene to render (defaults to the current scene)
        #[arg(long)]
        scene: Option<String>,

        /// Time given to capture sources to deliver a first frame
        #[arg(long, default_value = "500")]
        warmup_ms: u64,
    },

    /// Manage scenes
    #[command(subcommand)]
    Scene(SceneCommand),

    /// Manage sources within a scene
    #[command(subcommand)]
    Source(SourceCommand),

    /// List capturable windows
    Windows,

    /// List connected displays
    Displays,

    /// Check system capabilities
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransitionArg {
    Cut,
    Fade,
}

impl From<TransitionArg> for Transition {
    fn from(arg: TransitionArg) -> Self {
        match arg {
            TransitionArg::Cut => Transition::Cut,
            TransitionArg::Fade => Transition::fade(),
        }
    }
}

fn seconds(value: Option<f64>, flag: &str) -> anyhow::Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs).with_context(|| format!("invalid --{flag}: {secs}"))
        })
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref(), cli.scenes);

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    scenecast_common::logging::init_logging(&logging);
    scenecast_render_engine::placeholder::init_label_font(config.label_font.as_deref());

    match cli.command {
        Commands::Run {
            scene,
            stream_url,
            stream_key,
            record,
            duration,
            cycle_secs,
            transition,
        } => {
            let target = match (record, stream_url) {
                (Some(path), _) => Some(StreamTarget::File(path)),
                (None, Some(url)) => Some(StreamTarget::publish(url, stream_key.unwrap_or_default())),
                (None, None) => None,
            };
            let options = commands::run::RunOptions {
                scene,
                target,
                duration: seconds(duration, "duration")?,
                cycle: seconds(cycle_secs, "cycle-secs")?,
                transition: transition.into(),
            };
            commands::run::run(config, options).await
        }
        Commands::Snapshot {
            output,
            scene,
            warmup_ms,
        } => commands::snapshot::run(&config, output, scene, Duration::from_millis(warmup_ms)),
        Commands::Scene(command) => commands::scene::run(&config, command),
        Commands::Source(command) => commands::source::run(&config, command),
        Commands::Windows => commands::enumerate::windows(&config),
        Commands::Displays => commands::enumerate::displays(&config),
        Commands::Check => commands::check::run(),
    }
}
