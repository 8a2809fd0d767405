//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading layered configuration.
///
/// Absence of the environment override file is not an error; absence of the
/// primary file always is. Merging itself cannot fail: unknown keys and
/// shape mismatches are skipped by design, and the typed field registration
/// leaves no room for a runtime fault.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The primary config file does not exist.
    #[error("Primary config file does not exist: {path}")]
    PrimaryNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The primary config file exists but could not be opened.
    #[error("Failed to open primary config file {path}")]
    PrimaryOpen {
        /// The path that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The primary config file is not valid JSON for the target type.
    #[error("Failed to decode primary config file {path}")]
    PrimaryDecode {
        /// The path that failed to decode.
        path: PathBuf,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The environment override file exists but could not be opened.
    #[error("Failed to open environment config file {path}")]
    EnvironmentOpen {
        /// The derived override path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The environment override file is not a valid JSON object.
    #[error("Failed to decode environment config file {path}")]
    EnvironmentDecode {
        /// The derived override path.
        path: PathBuf,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A source file could not be stat'ed after a successful load.
    #[error("Failed to stat config file {path}")]
    Stat {
        /// The path that failed to stat.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The merged object could not be snapshotted for the cache.
    ///
    /// Only reachable for target types whose `Serialize` impl can fail,
    /// e.g. maps with non-string keys.
    #[error("Failed to snapshot merged config for caching")]
    Snapshot {
        /// The underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}
