//! Filesystem notifications for a single file.
//!
//! The file may not exist yet, and neither may the directories leading to
//! it. The watch is placed on the nearest existing ancestor directory and
//! moved down (or back up) as directories appear and disappear. Once the
//! file's own directory is watched, events are filtered down to the file
//! name.

use crate::FileEvent;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Errors that can occur while installing a watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The path has no file name component.
    #[error("cannot watch {}: not a file path", .path.display())]
    NotAFile {
        /// The rejected path.
        path: PathBuf,
    },

    /// None of the path's ancestors exists.
    #[error("cannot watch {}: no existing parent directory", .path.display())]
    NoExistingAncestor {
        /// The rejected path.
        path: PathBuf,
    },

    /// The notification backend refused the watch.
    #[error("failed to watch {}: {source}", .path.display())]
    Notify {
        /// The directory that could not be watched.
        path: PathBuf,
        /// The underlying notify error.
        #[source]
        source: notify::Error,
    },
}

/// The backend watcher and the directory it currently watches.
struct Armed {
    watcher: RecommendedWatcher,
    dir: PathBuf,
}

/// Watches a single file and forwards its events.
///
/// Dropping the watcher stops notifications and closes the event channel.
pub struct FileWatcher {
    path: PathBuf,
    armed: Arc<Mutex<Armed>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("path", &self.path)
            .field("dir", &self.armed.lock().dir)
            .finish()
    }
}

impl FileWatcher {
    /// Start watching `path`, sending events for it to `events`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(path: &Path, events: UnboundedSender<FileEvent>) -> Result<Self, WatchError> {
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| WatchError::NotAFile {
                path: path.to_path_buf(),
            })?;
        let dir = nearest_existing_dir(path).ok_or_else(|| WatchError::NoExistingAncestor {
            path: path.to_path_buf(),
        })?;

        // Raw events are handled on a task: the backend cannot be re-armed
        // from inside its own callback.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // The dispatch task is gone once the watcher is dropped.
                let _ = raw_tx.send(event);
            }
            Err(e) => tracing::warn!("file watcher error: {e}"),
        })
        .map_err(|e| WatchError::Notify {
            path: dir.clone(),
            source: e,
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Notify {
                path: dir.clone(),
                source: e,
            })?;

        let target = Target {
            path: path.to_path_buf(),
            parent: parent_dir(path),
            file_name,
        };
        if dir == target.parent {
            tracing::info!("watching {}", path.display());
        } else {
            tracing::info!(
                "watching {} until {} exists",
                dir.display(),
                target.parent.display()
            );
        }

        let armed = Arc::new(Mutex::new(Armed { watcher, dir }));
        tokio::spawn(dispatch(Arc::downgrade(&armed), target, raw_rx, events));

        Ok(Self {
            path: path.to_path_buf(),
            armed,
        })
    }

    #[cfg(test)]
    fn watched_dir(&self) -> PathBuf {
        self.armed.lock().dir.clone()
    }
}

struct Target {
    path: PathBuf,
    parent: PathBuf,
    file_name: OsString,
}

async fn dispatch(
    armed: Weak<Mutex<Armed>>,
    target: Target,
    mut raw: UnboundedReceiver<Event>,
    events: UnboundedSender<FileEvent>,
) {
    while let Some(event) = raw.recv().await {
        let Some(armed) = armed.upgrade() else {
            break;
        };
        if !handle_raw_event(&mut armed.lock(), &target, &event, &events) {
            break;
        }
    }
}

/// Returns false once nobody listens for file events anymore.
fn handle_raw_event(
    armed: &mut Armed,
    target: &Target,
    event: &Event,
    events: &UnboundedSender<FileEvent>,
) -> bool {
    if armed.dir == target.parent {
        if let Some(file_event) = classify(event, &target.file_name) {
            tracing::debug!(?file_event, "watched file event");
            return events.send(file_event).is_ok();
        }
        // The directory itself may have been removed or renamed away.
        if !matches!(
            event.kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        ) {
            return true;
        }
    }
    rearm(armed, target, events)
}

/// Move the watch to the nearest existing ancestor of the target.
fn rearm(armed: &mut Armed, target: &Target, events: &UnboundedSender<FileEvent>) -> bool {
    let Some(dir) = nearest_existing_dir(&target.path) else {
        return true;
    };
    if dir == armed.dir {
        return true;
    }

    if let Err(e) = armed.watcher.watch(&dir, RecursiveMode::NonRecursive) {
        tracing::warn!("failed to watch {}: {e}", dir.display());
        return true;
    }
    // The old directory may be gone already.
    let _ = armed.watcher.unwatch(&armed.dir);
    tracing::debug!("now watching {}", dir.display());
    armed.dir = dir;

    // The file may have been written before the watch reached its directory.
    if armed.dir == target.parent && target.path.is_file() {
        tracing::debug!("{} appeared with its directory", target.path.display());
        return events.send(FileEvent::Created).is_ok();
    }
    true
}

/// The directory holding `path`, `.` for a bare file name.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn nearest_existing_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .find(|p| p.is_dir())
        .map(Path::to_path_buf)
}

/// Map a raw notification to a file event, if it concerns `file_name`.
fn classify(event: &Event, file_name: &OsString) -> Option<FileEvent> {
    let is_target = |p: &PathBuf| p.file_name() == Some(file_name.as_os_str());

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths are [from, to]
            if event.paths.get(1).is_some_and(is_target) {
                Some(FileEvent::Created)
            } else if event.paths.first().is_some_and(is_target) {
                Some(FileEvent::Deleted)
            } else {
                None
            }
        }
        _ if !event.paths.iter().any(is_target) => None,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Some(FileEvent::Created)
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(FileEvent::Deleted)
        }
        EventKind::Modify(_) => Some(FileEvent::Changed),
        _ => None,
    }
}
