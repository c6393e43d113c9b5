//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine readable,
//! or to `logging.file` when one is configured.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `config.level`. Calling this twice keeps the first subscriber.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (writer, ansi) = match open_log_file(config) {
        Some(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(
            builder
                .with_target(true)
                .with_thread_names(true)
                .finish(),
        )
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn open_log_file(config: &LoggingConfig) -> Option<std::fs::File> {
    let path = config.file.as_ref()?;
    if let Some(parent) = path.parent() {
        // Best effort; the open below reports the real failure.
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "warning: cannot open log file {}: {e}; logging to stderr",
                path.display()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_with_parents() {
        let dir = std::env::temp_dir().join(format!("scenecast_log_{}", std::process::id()));
        let config = LoggingConfig {
            file: Some(dir.join("nested").join("scenecast.log")),
            ..LoggingConfig::default()
        };
        assert!(open_log_file(&config).is_some());
        assert!(dir.join("nested").join("scenecast.log").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn no_file_means_stderr() {
        assert!(open_log_file(&LoggingConfig::default()).is_none());
    }
}
