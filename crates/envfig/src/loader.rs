//! Uncached loading of a primary config file plus its environment overlay.
//!
//! Responsibilities:
//! - Open and decode the primary JSON file straight into the caller's type.
//! - Derive the override path from the primary path and environment name.
//! - Decode the override document and hand it to the merge engine.
//!
//! Does NOT handle:
//! - Caching or invalidation (see `cache` module).
//! - Merge semantics (see `merge` module).
//!
//! Invariants:
//! - A missing override file is success with only primary values applied.
//! - A present but malformed override file is an error; nothing about the
//!   override layer is best-effort except its absence.

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::LoadError;
use crate::merge::merge;
use crate::overlay::Overlay;

/// Loads `path` into `target`, then overlays the environment file if one
/// exists next to it.
///
/// The override path is derived by inserting the environment name before
/// the primary file's extension: `config.json` with environment `"dev"`
/// reads overrides from `config.dev.json`.
///
/// # Errors
///
/// Returns [`LoadError::PrimaryNotFound`] when the primary file is absent
/// and the respective open/decode variants for the other failure modes. A
/// missing override file is not an error.
pub fn load<T>(path: impl AsRef<Path>, environment: &str, target: &mut T) -> Result<(), LoadError>
where
    T: DeserializeOwned + Overlay,
{
    let path = path.as_ref();

    let primary = match File::open(path) {
        Ok(file) => file,
        Err(source) if source.kind() == ErrorKind::NotFound => {
            return Err(LoadError::PrimaryNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(LoadError::PrimaryOpen {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    *target = serde_json::from_reader(BufReader::new(primary)).map_err(|source| {
        LoadError::PrimaryDecode {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let override_path = environment_path(path, environment);
    let environment_file = match File::open(&override_path) {
        Ok(file) => file,
        Err(source) if source.kind() == ErrorKind::NotFound => {
            debug!(path = %override_path.display(), "No environment config file, primary values only");
            return Ok(());
        }
        Err(source) => {
            return Err(LoadError::EnvironmentOpen {
                path: override_path,
                source,
            });
        }
    };

    let overrides: Map<String, Value> = serde_json::from_reader(BufReader::new(environment_file))
        .map_err(|source| LoadError::EnvironmentDecode {
            path: override_path.clone(),
            source,
        })?;

    merge(&overrides, target);
    debug!(path = %override_path.display(), keys = overrides.len(), "Applied environment overrides");

    Ok(())
}

/// Derives the environment override path for a primary config path.
///
/// The environment name is inserted before the extension; a path without an
/// extension gets the environment name as its extension.
pub fn environment_path(path: &Path, environment: &str) -> PathBuf {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => path.with_extension(format!("{environment}.{ext}")),
        None => path.with_extension(environment),
    }
}
