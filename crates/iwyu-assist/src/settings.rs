//! User and project settings.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. The user file, `<config dir>/iwyu-assist/settings.json`
//! 3. The project file, `<project root>/.iwyu-assist.json`
//! 4. Command-line flags
//!
//! Every key is optional in every layer. List values from a higher layer
//! replace the lower layer's list.

use iwyu_translate::TranslateOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-project settings file.
pub const PROJECT_SETTINGS_FILE: &str = ".iwyu-assist.json";

/// Default analysis tool executable.
pub const DEFAULT_IWYU: &str = "include-what-you-use";

/// Default fix script executable.
pub const DEFAULT_FIX_INCLUDES: &str = "fix_includes.py";

/// Errors that can occur while reading settings files.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error reading a settings file.
    #[error("failed to read settings file {}: {source}", .path.display())]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid.
    #[error("invalid settings file {}: {source}", .path.display())]
    Parse {
        /// The malformed file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Path of the include-what-you-use executable.
    pub iwyu_path: PathBuf,
    /// Path of the `fix_includes.py` script.
    pub fix_includes_path: PathBuf,
    /// Database file or directory, relative to the project root.
    pub compile_commands: PathBuf,
    /// IWYU mapping files.
    pub mapping_files: Vec<String>,
    /// Extra IWYU flags.
    pub iwyu_args: Vec<String>,
    /// Extra `fix_includes.py` flags.
    pub fix_args: Vec<String>,
    /// Only remove includes that are safe to remove.
    pub fix_safe_headers: bool,
    /// Keep IWYU's "why" comments on added includes.
    pub fix_comments: bool,
    /// Re-sort include blocks.
    pub fix_reorder: bool,
    /// Skip files whose path matches this regular expression.
    pub fix_ignore_re: Option<String>,
    /// Only fix files whose path matches this regular expression.
    pub fix_only_re: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            iwyu_path: PathBuf::from(DEFAULT_IWYU),
            fix_includes_path: PathBuf::from(DEFAULT_FIX_INCLUDES),
            compile_commands: PathBuf::new(),
            mapping_files: Vec::new(),
            iwyu_args: Vec::new(),
            fix_args: Vec::new(),
            fix_safe_headers: true,
            fix_comments: true,
            fix_reorder: true,
            fix_ignore_re: None,
            fix_only_re: None,
        }
    }
}

/// One layer of settings; absent keys leave the lower layer untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct SettingsLayer {
    pub iwyu_path: Option<PathBuf>,
    pub fix_includes_path: Option<PathBuf>,
    pub compile_commands: Option<PathBuf>,
    pub mapping_files: Option<Vec<String>>,
    pub iwyu_args: Option<Vec<String>>,
    pub fix_args: Option<Vec<String>>,
    pub fix_safe_headers: Option<bool>,
    pub fix_comments: Option<bool>,
    pub fix_reorder: Option<bool>,
    pub fix_ignore_re: Option<String>,
    pub fix_only_re: Option<String>,
}

impl SettingsLayer {
    /// Read a layer from a JSON file. A missing file is an empty layer.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        tracing::debug!("reading settings from {}", path.display());
        serde_json::from_str(&source).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl Settings {
    /// Load defaults, the user file and the project file.
    pub fn load(project_root: &Path) -> Result<Self, SettingsError> {
        Self::load_from(
            user_settings_path().as_deref(),
            Some(&project_settings_path(project_root)),
        )
    }

    /// Load defaults plus the given user and project files.
    pub fn load_from(user: Option<&Path>, project: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        for path in [user, project].into_iter().flatten() {
            settings.apply(SettingsLayer::from_file(path)?);
        }
        Ok(settings)
    }

    /// Overlay a layer onto these settings.
    pub fn apply(&mut self, layer: SettingsLayer) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = layer.$field { self.$field = value; })*
            };
        }
        overlay!(
            iwyu_path,
            fix_includes_path,
            compile_commands,
            mapping_files,
            iwyu_args,
            fix_args,
            fix_safe_headers,
            fix_comments,
            fix_reorder,
        );
        if layer.fix_ignore_re.is_some() {
            self.fix_ignore_re = layer.fix_ignore_re;
        }
        if layer.fix_only_re.is_some() {
            self.fix_only_re = layer.fix_only_re;
        }
    }

    /// Whether switching to `other` moves the compilation database.
    ///
    /// This is the only key the database cache reacts to.
    pub fn database_changed(&self, other: &Self) -> bool {
        self.compile_commands != other.compile_commands
    }

    /// Translation options for a project.
    pub fn translate_options(&self, project_root: &Path) -> TranslateOptions {
        TranslateOptions::new(project_root)
            .with_mapping_files(self.mapping_files.iter().cloned())
            .with_iwyu_args(self.iwyu_args.iter().cloned())
    }

    /// Flags for `fix_includes.py`, preset flags first.
    pub fn fix_script_args(&self) -> Vec<String> {
        let toggle = |on: bool, name: &str| {
            if on {
                format!("--{name}")
            } else {
                format!("--no{name}")
            }
        };

        let mut args = vec![
            toggle(self.fix_safe_headers, "safe_headers"),
            toggle(self.fix_comments, "comments"),
            toggle(self.fix_reorder, "reorder"),
        ];
        if let Some(re) = &self.fix_ignore_re {
            args.push(format!("--ignore_re={re}"));
        }
        if let Some(re) = &self.fix_only_re {
            args.push(format!("--only_re={re}"));
        }
        args.extend(self.fix_args.iter().cloned());
        args
    }
}

/// The per-user settings file, if the platform has a config directory.
pub fn user_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("iwyu-assist").join("settings.json"))
}

/// The per-project settings file.
pub fn project_settings_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.iwyu_path, PathBuf::from("include-what-you-use"));
        assert_eq!(settings.fix_includes_path, PathBuf::from("fix_includes.py"));
        assert_eq!(settings.compile_commands, PathBuf::new());
        assert!(settings.mapping_files.is_empty());
    }

    #[test]
    fn test_layers_override_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.json");
        let project = dir.path().join("project.json");
        std::fs::write(
            &user,
            r#"{"iwyu_path": "/opt/iwyu", "mapping_files": ["a.imp"], "fix_comments": false}"#,
        )
        .unwrap();
        std::fs::write(&project, r#"{"mapping_files": ["b.imp"], "compile_commands": "build"}"#)
            .unwrap();

        let settings = Settings::load_from(Some(&user), Some(&project)).unwrap();
        assert_eq!(settings.iwyu_path, PathBuf::from("/opt/iwyu"));
        assert_eq!(settings.mapping_files, vec!["b.imp"]);
        assert_eq!(settings.compile_commands, PathBuf::from("build"));
        assert!(!settings.fix_comments);
    }

    #[test]
    fn test_missing_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::load_from(Some(&dir.path().join("nope.json")), None).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, r#"{"iwyu_pth": "x"}"#).unwrap();
        assert!(matches!(
            Settings::load_from(None, Some(&path)),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_database_changed_only_tracks_compile_commands() {
        let base = Settings::default();
        let mut other = base.clone();
        other.iwyu_args.push("--verbose=3".to_string());
        assert!(!base.database_changed(&other));
        other.compile_commands = PathBuf::from("out");
        assert!(base.database_changed(&other));
    }

    #[test]
    fn test_fix_script_args() {
        let mut settings = Settings {
            fix_safe_headers: false,
            fix_only_re: Some("src/.*".to_string()),
            ..Settings::default()
        };
        settings.fix_args.push("--dry_run".to_string());
        assert_eq!(
            settings.fix_script_args(),
            vec![
                "--nosafe_headers",
                "--comments",
                "--reorder",
                "--only_re=src/.*",
                "--dry_run",
            ]
        );
    }
}
