//! A project session: settings plus the live compilation database.

use crate::process::{
    analysis_invocation, fix_invocation, run_analysis, run_fix, Invocation, ProcessError,
    ProcessOutput,
};
use crate::settings::Settings;
use iwyu_compdb::{CompileDbCache, CompileEntry, DbStatus};
use iwyu_translate::translate;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced to the user when a file cannot be processed.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The compilation database is missing, empty or unreadable.
    #[error("compilation database {} is missing or invalid ({status})", display_opt(.path))]
    DatabaseInvalid {
        /// The database file, if a project root is known.
        path: Option<PathBuf>,
        /// Status at the time of the query.
        status: DbStatus,
    },

    /// The database has no entry for the file.
    #[error("no compile command found for {}", .file.display())]
    NoEntryForFile {
        /// The file that was looked up.
        file: PathBuf,
    },

    /// Running an external tool failed.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

fn display_opt(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map_or_else(|| "<none>".to_string(), |p| p.display().to_string())
}

/// Everything needed to process one file.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// The file as requested.
    pub file: PathBuf,
    /// Its database entry.
    pub entry: CompileEntry,
    /// The include-what-you-use run.
    pub analysis: Invocation,
    /// The `fix_includes.py` run.
    pub fix: Invocation,
}

/// Output of a full run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// include-what-you-use output.
    pub analysis: ProcessOutput,
    /// `fix_includes.py` output, unless fixing was skipped.
    pub fix: Option<ProcessOutput>,
}

/// Settings and compilation database for one project root.
#[derive(Debug)]
pub struct Session {
    root: PathBuf,
    settings: Settings,
    cache: CompileDbCache,
}

impl Session {
    /// Open a session. Must be called inside a Tokio runtime.
    ///
    /// With `watch` set, the database file is watched for changes.
    pub fn open(root: PathBuf, settings: Settings, watch: bool) -> Self {
        let cache = if watch {
            CompileDbCache::open(Some(root.clone()), &settings.compile_commands)
        } else {
            CompileDbCache::open_unwatched(Some(root.clone()), &settings.compile_commands)
        };
        Self {
            root,
            settings,
            cache,
        }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current settings.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The compilation database cache.
    pub const fn cache(&self) -> &CompileDbCache {
        &self.cache
    }

    /// Replace the settings, moving the database if its location changed.
    pub fn apply_settings(&mut self, settings: Settings) {
        if self.settings.database_changed(&settings) {
            self.cache.set_database_setting(&settings.compile_commands);
        }
        self.settings = settings;
    }

    /// Look up `file` and build both invocations for it.
    pub async fn prepare(&self, file: &Path) -> Result<Prepared, SessionError> {
        if !self.cache.is_valid().await {
            return Err(SessionError::DatabaseInvalid {
                path: self.cache.database_path(),
                status: self.cache.status().await,
            });
        }

        let entry = self
            .cache
            .lookup(file)
            .await
            .ok_or_else(|| SessionError::NoEntryForFile {
                file: file.to_path_buf(),
            })?;

        let args = translate(&entry.command, &self.settings.translate_options(&self.root));
        let analysis = analysis_invocation(&self.settings, &entry, args);
        let fix = fix_invocation(&self.settings, &entry);

        Ok(Prepared {
            file: file.to_path_buf(),
            entry,
            analysis,
            fix,
        })
    }

    /// Run the analysis on `file` and, unless `fix` is false, apply it.
    pub async fn run(&self, file: &Path, fix: bool) -> Result<RunReport, SessionError> {
        let prepared = self.prepare(file).await?;
        let analysis = run_analysis(&prepared.analysis).await?;

        let fix = if fix {
            Some(run_fix(&prepared.fix, &analysis.text).await?)
        } else {
            None
        };

        Ok(RunReport { analysis, fix })
    }
}
