//! Errors raised while loading configuration files.

use std::path::PathBuf;

/// Failure reading or parsing a [`crate::ConfigurationFile`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read from disk.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file's contents did not parse as a configuration document.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// The filesystem watcher could not be set up for live-reload.
    #[error("failed to watch configuration file {path}: {source}")]
    Watch {
        /// Path that could not be watched.
        path: PathBuf,
        /// Underlying watcher failure.
        #[source]
        source: notify::Error,
    },
}
