//! Errors raised while loading and resolving mission configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or resolving the config tree.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An object met a non-object while merging two documents.
    #[error("cannot merge object with non-object at '{pointer}'")]
    InvalidMerge { pointer: String },

    /// `deps` references were still present after the maximum number of rounds.
    #[error("could not resolve config dependencies, max recursion depth of {max} reached")]
    DependencyDepth { max: usize },

    /// A requested mission is not present in the config.
    #[error("mission '{name}' not found in config, available missions: [{available}]")]
    UnknownMission { name: String, available: String },

    /// A JSON pointer does not address anything in the document.
    #[error("no config entry at '{0}'")]
    MissingPointer(String),

    /// A value expected to be a string or list of strings is something else.
    #[error("expected a string or list of strings at '{0}'")]
    NotAStringList(String),

    /// A kernel pattern is not a valid regular expression.
    #[error("invalid kernel pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// No config file exists for the mission.
    #[error("no config file for mission '{0}'")]
    ConfigNotFound(String),

    /// A config file is not valid JSON.
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A config file or data directory could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
