//! Layered JSON configuration loading with per-environment override files.
//!
//! A primary JSON file is decoded straight into a caller-supplied struct,
//! then an optional environment file (`config.json` + `"dev"` →
//! `config.dev.json`) is overlaid onto it field by field. Override files
//! are partial: any subset of fields, any nesting depth; unknown keys and
//! type mismatches are ignored rather than rejected. [`load_cached`] adds a
//! process-wide cache keyed by `(path, environment)`, invalidated by a
//! background thread that polls both files' modification times.
//!
//! Structs register which override keys map to which fields with the
//! [`overlay!`] macro:
//!
//! ```
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Debug, Default, Deserialize, PartialEq)]
//! struct AppConfig {
//!     name: String,
//!     count: i64,
//! }
//!
//! envfig::overlay! {
//!     AppConfig {
//!         "name" => name,
//!         "count" => count,
//!     }
//! }
//!
//! let mut config = AppConfig { name: "A".to_string(), count: 1 };
//! let overrides = match json!({"count": 2, "unknown": true}) {
//!     serde_json::Value::Object(map) => map,
//!     _ => unreachable!(),
//! };
//! envfig::merge(&overrides, &mut config);
//!
//! assert_eq!(config, AppConfig { name: "A".to_string(), count: 2 });
//! ```

pub mod cache;
mod error;
mod loader;
mod merge;
mod overlay;

pub use cache::{ConfigCache, DEFAULT_POLL_INTERVAL, load_cached, set_reload_interval};
pub use error::LoadError;
pub use loader::{environment_path, load};
pub use merge::merge;
pub use overlay::{
    NumericTarget, Overlay, OverlayMap, OverlayOpt, OverlaySeq, OverlayStruct, Target,
};
