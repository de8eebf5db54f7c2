//! Compilation database cache.
//!
//! This crate keeps an in-memory view of a project's
//! `compile_commands.json`, mapping each source file to the compiler
//! invocation that builds it.
//!
//! # Features
//!
//! - `command` and `arguments` record forms
//! - Canonical file identities as keys (last duplicate wins)
//! - Automatic reload on create / change, clearing on delete
//! - Re-pointing when the configured database location changes
//! - Load generations so a superseded load never overwrites newer data
//!
//! # Example
//!
//! ```ignore
//! use iwyu_compdb::CompileDbCache;
//! use std::path::{Path, PathBuf};
//!
//! let cache = CompileDbCache::open(Some(PathBuf::from("/proj")), "build");
//! if cache.is_valid().await {
//!     if let Some(entry) = cache.lookup(Path::new("src/main.cpp")).await {
//!         println!("{} (in {})", entry.command, entry.directory.display());
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod database;
mod path;
mod watcher;

pub use cache::{CompileDbCache, DbStatus, FileEvent};
pub use database::{load_database, parse_database, CompileDatabase, CompileEntry};
pub use path::{canonical_identity, normalize_lexically, resolve_database_path, DEFAULT_DATABASE_NAME};
pub use watcher::{FileWatcher, WatchError};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading the database file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The database file does not exist.
    #[error("compilation database not found: {}", .path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// IO error reading the database file.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid compilation database.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// The malformed file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
