//! Process-wide cached loading, exercised end to end.
//!
//! These tests share the global cache and its polling thread, so they are
//! serialized and each one works on its own temp files.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

use envfig::{DEFAULT_POLL_INTERVAL, load_cached, set_reload_interval};

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct App {
    name: String,
    count: i64,
}

envfig::overlay! {
    App {
        "name" => name,
        "count" => count,
    }
}

fn write_config(dir: &TempDir, name: &str, value: serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

/// Restores the default polling interval when a test is done with it.
struct IntervalGuard;

impl Drop for IntervalGuard {
    fn drop(&mut self) {
        set_reload_interval(DEFAULT_POLL_INTERVAL);
    }
}

#[test]
#[serial]
fn cached_loads_return_independent_copies() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", json!({"name": "A", "count": 1}));

    let mut first = App::default();
    load_cached(&path, "test", &mut first).unwrap();
    let mut second = App::default();
    load_cached(&path, "test", &mut second).unwrap();

    assert_eq!(first, second);

    first.count += 1;
    assert_ne!(
        first.count, second.count,
        "mutating one copy must not affect the other"
    );
}

#[test]
#[serial]
fn cached_load_applies_environment_override() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", json!({"name": "A", "count": 1}));
    write_config(&dir, "config.test.json", json!({"count": 2}));

    let mut config = App::default();
    load_cached(&path, "test", &mut config).unwrap();

    assert_eq!(config.name, "A");
    assert_eq!(config.count, 2);
}

#[test]
#[serial]
fn stale_value_served_until_interval_elapses() {
    let _guard = IntervalGuard;

    // Long enough that no sweep runs during the stale check.
    set_reload_interval(Duration::from_secs(600));

    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "config.json", json!({"name": "A", "count": 1}));

    let mut initial = App::default();
    load_cached(&path, "test", &mut initial).unwrap();
    assert_eq!(initial.count, 1);

    // Past mtime granularity before modifying the file.
    thread::sleep(Duration::from_millis(1100));
    fs::write(&path, json!({"name": "A", "count": 2}).to_string()).unwrap();

    // The polling interval has not elapsed: still the cached value.
    let mut stale = App::default();
    load_cached(&path, "test", &mut stale).unwrap();
    assert_eq!(stale.count, 1, "expected the cached value before the sweep");

    set_reload_interval(Duration::from_millis(200));
    thread::sleep(Duration::from_millis(1000));

    let mut fresh = App::default();
    load_cached(&path, "test", &mut fresh).unwrap();
    assert_eq!(fresh.count, 2, "expected a reload after the sweep");
}

#[test]
#[serial]
fn failed_cached_load_reports_loader_error() {
    let dir = TempDir::new().unwrap();

    let mut config = App::default();
    let result = load_cached(dir.path().join("missing.json"), "test", &mut config);
    assert!(matches!(
        result,
        Err(envfig::LoadError::PrimaryNotFound { .. })
    ));

    // A later valid load for the same key must succeed from scratch.
    let path = write_config(&dir, "missing.json", json!({"name": "A", "count": 5}));
    load_cached(&path, "test", &mut config).unwrap();
    assert_eq!(config.count, 5);
}
