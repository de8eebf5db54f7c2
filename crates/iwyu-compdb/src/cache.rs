//! Live, file-watched view of a project's compilation database.
//!
//! # Lifecycle
//!
//! 1. [`CompileDbCache::open`] resolves the database location, installs a
//!    watcher and starts the initial load
//! 2. Filesystem events and configuration changes start further loads
//! 3. [`CompileDbCache::is_valid`] and [`CompileDbCache::lookup`] wait for
//!    the load that is current when they are called, then answer
//! 4. Dropping the cache (or [`CompileDbCache::close`]) releases the watcher
//!
//! # Load generations
//!
//! Every load takes a new generation number. Loads are never cancelled, but
//! only the load holding the latest generation may commit its result, so a
//! slow superseded load cannot overwrite newer data. Queries wait until a
//! generation at least as new as the one current at call time has settled.
//!
//! The committed map is swapped in as a whole under a lock; readers never
//! see a partially populated database.

use crate::database::{load_database, CompileDatabase, CompileEntry};
use crate::path::{absolutize, canonical_identity_async, resolve_database_path};
use crate::watcher::FileWatcher;
use crate::LoadError;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};

/// A filesystem event on a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    /// The file appeared.
    Created,
    /// The file content changed.
    Changed,
    /// The file was removed.
    Deleted,
}

/// Observable state of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbStatus {
    /// No project root is known.
    Uninitialized,
    /// A load is in flight.
    Loading,
    /// The database was read and has entries.
    Valid {
        /// Number of files in the database.
        entries: usize,
    },
    /// The database was read but contained no usable records.
    Empty,
    /// The database file does not exist (or was deleted).
    NotFound,
    /// The database file exists but could not be read or parsed.
    ///
    /// Data from an earlier successful load is kept.
    ParseFailed(String),
}

impl DbStatus {
    /// Short human readable label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Valid { .. } => "valid",
            Self::Empty => "empty",
            Self::NotFound => "not found",
            Self::ParseFailed(_) => "parse failed",
        }
    }
}

impl std::fmt::Display for DbStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid { entries } => write!(f, "valid ({entries} entries)"),
            Self::ParseFailed(message) => write!(f, "parse failed: {message}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Committed database state, replaced under a single write lock.
#[derive(Debug)]
struct State {
    entries: Arc<CompileDatabase>,
    /// The backing file was found at the last load.
    db_exists: bool,
    status: DbStatus,
}

#[derive(Debug)]
struct Shared {
    project_root: Option<PathBuf>,
    database_path: RwLock<Option<PathBuf>>,
    state: RwLock<State>,
    /// Generation of the most recently started load.
    generation: AtomicU64,
    /// Highest generation that has finished (committed or discarded).
    settled: watch::Sender<u64>,
    /// Identifies the active watcher; events from older watchers are dropped.
    watch_epoch: AtomicU64,
}

impl Shared {
    fn database_path(&self) -> Option<PathBuf> {
        self.database_path.read().clone()
    }

    fn start_load(self: &Arc<Self>) {
        let Some(root) = self.project_root.clone() else {
            return;
        };
        let Some(path) = self.database_path() else {
            return;
        };

        let generation = {
            let mut state = self.state.write();
            state.status = DbStatus::Loading;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        tracing::debug!(generation, "loading {}", path.display());

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = load_database(&path, &root).await;
            shared.commit(generation, &path, result);
            shared.settle(generation);
        });
    }

    fn commit(&self, generation: u64, path: &Path, result: Result<CompileDatabase, LoadError>) {
        let mut state = self.state.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "discarding superseded load");
            return;
        }

        match result {
            Ok(entries) => {
                tracing::info!(
                    "loaded {} compile commands from {}",
                    entries.len(),
                    path.display()
                );
                state.db_exists = true;
                state.status = if entries.is_empty() {
                    DbStatus::Empty
                } else {
                    DbStatus::Valid {
                        entries: entries.len(),
                    }
                };
                state.entries = Arc::new(entries);
            }
            Err(LoadError::NotFound { .. }) => {
                tracing::warn!("compilation database not found: {}", path.display());
                state.db_exists = false;
                state.status = DbStatus::NotFound;
            }
            Err(e) => {
                tracing::error!("{e}");
                state.db_exists = true;
                state.status = DbStatus::ParseFailed(e.to_string());
            }
        }
    }

    fn settle(&self, generation: u64) {
        self.settled.send_modify(|settled| *settled = (*settled).max(generation));
    }

    fn clear(&self) {
        let generation = {
            let mut state = self.state.write();
            state.entries = Arc::new(CompileDatabase::new());
            state.db_exists = false;
            state.status = DbStatus::NotFound;
            // Bumped under the lock so no in-flight load can commit afterwards.
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        tracing::info!("compilation database deleted, cache cleared");
        self.settle(generation);
    }

    fn handle_event(self: &Arc<Self>, event: FileEvent) {
        match event {
            FileEvent::Created | FileEvent::Changed => self.start_load(),
            FileEvent::Deleted => self.clear(),
        }
    }

    async fn wait_for_current_load(&self) {
        let target = self.generation.load(Ordering::SeqCst);
        let mut settled = self.settled.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = settled.wait_for(|s| *s >= target).await;
    }
}

/// Cache of a project's file-to-invocation mapping.
///
/// All constructors and mutators must be called from within a Tokio
/// runtime, since loads run as spawned tasks.
#[derive(Debug)]
pub struct CompileDbCache {
    shared: Arc<Shared>,
    watcher: Mutex<Option<FileWatcher>>,
    watching: bool,
}

impl CompileDbCache {
    /// Open the cache for a project, watching the database file.
    ///
    /// `database` is the configured database location (see
    /// [`resolve_database_path`]). Without a project root the cache stays
    /// [`DbStatus::Uninitialized`].
    pub fn open(project_root: Option<PathBuf>, database: impl AsRef<Path>) -> Self {
        Self::create(project_root, database.as_ref(), true)
    }

    /// Open the cache without a filesystem watcher.
    ///
    /// The database is loaded once; further loads happen only through
    /// [`reload`](Self::reload), [`handle_event`](Self::handle_event) or
    /// [`set_database_setting`](Self::set_database_setting).
    pub fn open_unwatched(project_root: Option<PathBuf>, database: impl AsRef<Path>) -> Self {
        Self::create(project_root, database.as_ref(), false)
    }

    fn create(project_root: Option<PathBuf>, database: &Path, watching: bool) -> Self {
        let database_path = project_root
            .as_deref()
            .map(|root| resolve_database_path(root, database));
        let status = if project_root.is_some() {
            DbStatus::Loading
        } else {
            tracing::info!("no project root, compilation database disabled");
            DbStatus::Uninitialized
        };
        let (settled, _) = watch::channel(0);

        let cache = Self {
            shared: Arc::new(Shared {
                project_root,
                database_path: RwLock::new(database_path.clone()),
                state: RwLock::new(State {
                    entries: Arc::new(CompileDatabase::new()),
                    db_exists: false,
                    status,
                }),
                generation: AtomicU64::new(0),
                settled,
                watch_epoch: AtomicU64::new(0),
            }),
            watcher: Mutex::new(None),
            watching,
        };

        if let Some(path) = database_path {
            if watching {
                cache.install_watcher(&path);
            }
            cache.shared.start_load();
        }

        cache
    }

    /// Replace the watcher with one on `path`.
    fn install_watcher(&self, path: &Path) {
        let mut slot = self.watcher.lock();
        // Release the old watcher before the new one exists.
        drop(slot.take());

        let epoch = self.shared.watch_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        match FileWatcher::new(path, tx) {
            Ok(watcher) => {
                *slot = Some(watcher);
                tokio::spawn(forward_events(Arc::downgrade(&self.shared), epoch, rx));
            }
            Err(e) => tracing::warn!("{e}; database changes will not be picked up"),
        }
    }

    /// The resolved database file path, if a project root is known.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.shared.database_path()
    }

    /// Apply a new database location setting.
    ///
    /// Nothing happens when the setting resolves to the current path.
    /// Otherwise the watcher is moved to the new location and a fresh load
    /// starts.
    pub fn set_database_setting(&self, database: impl AsRef<Path>) {
        let Some(root) = self.shared.project_root.as_deref() else {
            return;
        };
        let path = resolve_database_path(root, database.as_ref());
        if self.shared.database_path().as_deref() == Some(path.as_path()) {
            tracing::debug!("database location unchanged");
            return;
        }

        tracing::info!("database location changed to {}", path.display());
        *self.shared.database_path.write() = Some(path.clone());
        if self.watching {
            self.install_watcher(&path);
        }
        self.shared.start_load();
    }

    /// React to a filesystem event on the database file.
    ///
    /// `Created` and `Changed` start a load. `Deleted` clears the cache
    /// immediately and supersedes any in-flight load; the watcher is kept.
    pub fn handle_event(&self, event: FileEvent) {
        if self.shared.project_root.is_none() {
            return;
        }
        self.shared.handle_event(event);
    }

    /// Start a fresh load of the database file.
    pub fn reload(&self) {
        self.shared.start_load();
    }

    /// Whether the database file exists and produced at least one entry.
    pub async fn is_valid(&self) -> bool {
        self.shared.wait_for_current_load().await;
        let state = self.shared.state.read();
        state.db_exists && !state.entries.is_empty()
    }

    /// The build invocation for `file`, if the database has one.
    ///
    /// Relative paths are resolved against the project root.
    pub async fn lookup(&self, file: &Path) -> Option<CompileEntry> {
        let root = self.shared.project_root.as_deref()?;
        let key = canonical_identity_async(&absolutize(root, file)).await;
        self.shared.wait_for_current_load().await;
        let found = self.shared.state.read().entries.get(&key).cloned();
        if found.is_none() {
            tracing::debug!("no compile command for {}", key.display());
        }
        found
    }

    /// Current status, after waiting for the current load.
    pub async fn status(&self) -> DbStatus {
        self.shared.wait_for_current_load().await;
        self.shared.state.read().status.clone()
    }

    /// Snapshot of the committed database, after waiting for the current load.
    pub async fn snapshot(&self) -> Arc<CompileDatabase> {
        self.shared.wait_for_current_load().await;
        Arc::clone(&self.shared.state.read().entries)
    }

    /// A receiver notified whenever a load settles or the cache is cleared.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.settled.subscribe()
    }

    /// Release the watcher. Queries keep answering from the last state.
    pub fn close(&self) {
        self.shared.watch_epoch.fetch_add(1, Ordering::SeqCst);
        drop(self.watcher.lock().take());
    }
}

/// Forward watcher events into the cache until the watcher is replaced.
async fn forward_events(shared: Weak<Shared>, epoch: u64, mut rx: mpsc::UnboundedReceiver<FileEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.watch_epoch.load(Ordering::SeqCst) != epoch {
            break;
        }
        shared.handle_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(DbStatus::Valid { entries: 3 }.to_string(), "valid (3 entries)");
        assert_eq!(DbStatus::NotFound.to_string(), "not found");
        assert_eq!(
            DbStatus::ParseFailed("bad".to_string()).to_string(),
            "parse failed: bad"
        );
    }

    #[tokio::test]
    async fn test_uninitialized_cache() {
        let cache = CompileDbCache::open(None, "");
        assert!(!cache.is_valid().await);
        assert_eq!(cache.status().await, DbStatus::Uninitialized);
        assert!(cache.lookup(Path::new("/a.c")).await.is_none());
        assert!(cache.database_path().is_none());
    }

    #[tokio::test]
    async fn test_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CompileDbCache::open_unwatched(Some(dir.path().to_path_buf()), "");
        assert!(!cache.is_valid().await);
        assert_eq!(cache.status().await, DbStatus::NotFound);
    }
}
