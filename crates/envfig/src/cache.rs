//! Cached loading with mtime-polled invalidation.
//!
//! Responsibilities:
//! - Keep one merged snapshot per `(path, environment)` key behind a
//!   reader/writer lock.
//! - Run a background sweep thread that evicts entries whose source files
//!   have a newer modification time than the one recorded at load.
//! - Expose the process-wide cache behind [`load_cached`] and
//!   [`set_reload_interval`].
//!
//! Does NOT handle:
//! - Loading and merging themselves (see `loader` module).
//!
//! Invariants:
//! - Snapshots are stored as JSON values; every hit deserializes a fresh
//!   copy, so a caller can never mutate the cache or another caller's copy.
//! - A failed load is never cached; the loader's error is returned verbatim.
//! - Sweep I/O happens outside the map lock; only the eviction takes the
//!   exclusive lock.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::LoadError;
use crate::loader::{self, environment_path};
use crate::overlay::Overlay;

/// How often source files are polled for changes unless reconfigured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A source file path with the modification time recorded at load.
#[derive(Clone)]
struct FileStamp {
    path: PathBuf,
    modified: SystemTime,
}

impl FileStamp {
    fn record(path: &Path) -> Result<Self, LoadError> {
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|source| LoadError::Stat {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            modified,
        })
    }

    /// Whether the file on disk is now newer than the recorded time.
    /// `None` when the stat fails.
    fn is_stale(&self) -> Option<bool> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()?;
        Some(modified > self.modified)
    }
}

struct CacheEntry {
    primary: FileStamp,
    /// `None` when no override file existed at load time.
    environment: Option<FileStamp>,
    /// Structural snapshot of the merged object.
    snapshot: Value,
}

type Entries = RwLock<HashMap<String, CacheEntry>>;

struct Ticker {
    stop: mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// A keyed cache of merged configurations with background invalidation.
///
/// Entries are tagged with the modification times of both source files; a
/// dedicated thread polls those files and evicts entries that went stale,
/// so the next load for that key re-reads fresh content.
pub struct ConfigCache {
    entries: Arc<Entries>,
    ticker: Mutex<Option<Ticker>>,
}

impl ConfigCache {
    /// Creates a cache and starts its polling thread at `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        let cache = Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ticker: Mutex::new(None),
        };
        cache.set_reload_interval(poll_interval);
        cache
    }

    /// Loads through the cache.
    ///
    /// A hit deserializes the stored snapshot into `target`; a miss loads
    /// and merges under the exclusive lock, stats both source files and
    /// inserts a snapshot of the merged object. The double check after
    /// taking the exclusive lock keeps concurrent first accesses of the
    /// same key from loading twice.
    ///
    /// # Errors
    ///
    /// Propagates the underlying [`loader::load`] error unchanged, plus
    /// [`LoadError::Stat`] when a source file cannot be stat'ed right after
    /// a successful load.
    pub fn load<T>(
        &self,
        path: impl AsRef<Path>,
        environment: &str,
        target: &mut T,
    ) -> Result<(), LoadError>
    where
        T: Serialize + DeserializeOwned + Overlay,
    {
        let path = path.as_ref();
        let key = cache_key(path, environment);

        {
            let entries = read_lock(&self.entries);
            if let Some(copy) = restore::<T>(entries.get(&key)) {
                *target = copy;
                debug!(key = %key, "Config cache hit");
                return Ok(());
            }
            // Absent, or the snapshot no longer fits the requested type
            // (same key loaded with a different shape): take the slow path
            // and replace the entry.
        }

        let mut entries = write_lock(&self.entries);
        if let Some(copy) = restore::<T>(entries.get(&key)) {
            *target = copy;
            return Ok(());
        }

        loader::load(path, environment, target)?;

        let primary = FileStamp::record(path)?;
        let override_path = environment_path(path, environment);
        let environment_stamp = match std::fs::metadata(&override_path) {
            Ok(meta) => {
                let modified = meta.modified().map_err(|source| LoadError::Stat {
                    path: override_path.clone(),
                    source,
                })?;
                Some(FileStamp {
                    path: override_path,
                    modified,
                })
            }
            Err(source) if source.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(LoadError::Stat {
                    path: override_path,
                    source,
                });
            }
        };

        let snapshot =
            serde_json::to_value(&*target).map_err(|source| LoadError::Snapshot { source })?;

        debug!(key = %key, "Config cache insert");
        entries.insert(
            key,
            CacheEntry {
                primary,
                environment: environment_stamp,
                snapshot,
            },
        );

        Ok(())
    }

    /// Restarts the polling thread at a new interval.
    ///
    /// The previous thread, if any, is stopped and joined before the new
    /// one starts; concurrent calls serialize on the ticker lock.
    pub fn set_reload_interval(&self, poll_interval: Duration) {
        let mut ticker = lock(&self.ticker);
        if let Some(previous) = ticker.take() {
            stop_ticker(previous);
        }

        let entries = Arc::clone(&self.entries);
        let (stop, stop_rx) = mpsc::channel();
        let thread = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(poll_interval) {
                    Err(RecvTimeoutError::Timeout) => sweep(&entries),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        *ticker = Some(Ticker { stop, thread });
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConfigCache {
    fn drop(&mut self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            stop_ticker(ticker);
        }
    }
}

fn stop_ticker(ticker: Ticker) {
    // The thread may have exited already if its receiver hung up.
    let _ = ticker.stop.send(());
    let _ = ticker.thread.join();
}

/// One polling round: stat every entry's source files outside the lock and
/// evict the stale ones under the exclusive lock.
///
/// A stat failure leaves the entry in place for this round; transient
/// filesystem trouble must not empty the cache.
fn sweep(entries: &Entries) {
    let stamps: Vec<(String, FileStamp, Option<FileStamp>)> = {
        let entries = read_lock(entries);
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.primary.clone(), entry.environment.clone()))
            .collect()
    };

    let mut stale_keys = Vec::new();
    for (key, primary, environment) in stamps {
        let Some(primary_stale) = primary.is_stale() else {
            continue;
        };
        let environment_stale = match &environment {
            Some(stamp) => match stamp.is_stale() {
                Some(stale) => stale,
                None => continue,
            },
            None => false,
        };

        if primary_stale || environment_stale {
            stale_keys.push(key);
        }
    }

    if stale_keys.is_empty() {
        return;
    }

    let mut entries = write_lock(entries);
    for key in stale_keys {
        debug!(key = %key, "Evicting stale config cache entry");
        entries.remove(&key);
    }
}

/// Deserializes an entry's snapshot into a fresh, unaliased copy.
fn restore<T: DeserializeOwned>(entry: Option<&CacheEntry>) -> Option<T> {
    serde_json::from_value(entry?.snapshot.clone()).ok()
}

fn cache_key(path: &Path, environment: &str) -> String {
    format!("{}_{}", path.display(), environment)
}

// Lock poisoning only happens if a panic escaped while holding the lock;
// the map is still structurally sound, so recover the guard.
fn read_lock(entries: &Entries) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
    entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(entries: &Entries) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
    entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock(ticker: &Mutex<Option<Ticker>>) -> std::sync::MutexGuard<'_, Option<Ticker>> {
    ticker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn global() -> &'static ConfigCache {
    static GLOBAL: OnceLock<ConfigCache> = OnceLock::new();
    GLOBAL.get_or_init(|| ConfigCache::new(DEFAULT_POLL_INTERVAL))
}

/// Loads through the process-wide cache.
///
/// See [`ConfigCache::load`] for the contract. The cache's polling thread
/// starts on first use at [`DEFAULT_POLL_INTERVAL`].
pub fn load_cached<T>(
    path: impl AsRef<Path>,
    environment: &str,
    target: &mut T,
) -> Result<(), LoadError>
where
    T: Serialize + DeserializeOwned + Overlay,
{
    global().load(path, environment, target)
}

/// Reconfigures how often the process-wide cache polls for file changes.
pub fn set_reload_interval(poll_interval: Duration) {
    global().set_reload_interval(poll_interval);
}
