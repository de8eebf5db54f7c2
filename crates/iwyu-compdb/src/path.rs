//! Path resolution for database locations and file identities.

use std::path::{Component, Path, PathBuf};

/// File name used when the configured database location is a directory.
pub const DEFAULT_DATABASE_NAME: &str = "compile_commands.json";

/// Resolve the configured database location to a file path.
///
/// An empty setting means the project root. Relative settings are joined to
/// the project root. A setting that names a directory gets
/// [`DEFAULT_DATABASE_NAME`] appended.
///
/// Whether the setting names a directory is decided from its spelling
/// alone, never from the filesystem, so a build directory that does not
/// exist yet resolves the same way it will once it does.
pub fn resolve_database_path(project_root: &Path, setting: &Path) -> PathBuf {
    if setting.as_os_str().is_empty() {
        return project_root.join(DEFAULT_DATABASE_NAME);
    }

    let path = absolutize(project_root, setting);
    if names_directory(setting) {
        path.join(DEFAULT_DATABASE_NAME)
    } else {
        path
    }
}

/// Whether a database setting names a directory rather than a file.
///
/// True for a trailing separator or for a last component without a `.json`
/// extension.
fn names_directory(setting: &Path) -> bool {
    let raw = setting.as_os_str().to_string_lossy();
    if raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) {
        return true;
    }
    !setting
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Canonical identity of a file, used as the database key.
///
/// Existing files are canonicalized through the filesystem so symlinks and
/// case differences resolve the same way for every caller. Files that do
/// not exist fall back to lexical normalization of the absolute path.
pub fn canonical_identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

/// [`canonical_identity`] without blocking the async runtime.
pub(crate) async fn canonical_identity_async(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| normalize_lexically(path))
}

/// Remove `.` components and fold `..` into the preceding name.
///
/// `..` directly after the root is dropped; leading `..` of a relative path
/// are kept.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            _ => out.push(component),
        }
    }
    out.iter().collect()
}

/// Join `path` onto `base` unless it is already absolute.
pub(crate) fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
