//! Parsing of `compile_commands.json` documents.

use crate::path::{absolutize, canonical_identity};
use crate::LoadError;
use iwyu_translate::join_command;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One build invocation for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileEntry {
    /// The full, unparsed compiler invocation.
    pub command: String,
    /// Working directory the invocation runs in.
    pub directory: PathBuf,
}

/// Mapping from canonical file identity to its build invocation.
pub type CompileDatabase = HashMap<PathBuf, CompileEntry>;

/// A record as it appears in the JSON document.
#[derive(Debug, Deserialize)]
struct RawRecord {
    directory: Option<String>,
    command: Option<String>,
    arguments: Option<Vec<String>>,
    file: Option<String>,
}

impl RawRecord {
    /// The command string, rebuilt from `arguments` when `command` is absent.
    fn effective_command(&self) -> Option<String> {
        match (&self.command, &self.arguments) {
            (Some(command), _) if !command.trim().is_empty() => Some(command.clone()),
            (_, Some(arguments)) if !arguments.is_empty() => Some(join_command(arguments)),
            _ => None,
        }
    }
}

/// Parse a compilation database document.
///
/// Relative `directory` values are resolved against `project_root`; relative
/// `file` values against the record's directory. Records without a file or
/// without a non-empty command are skipped. When a file appears more than
/// once the last record wins.
pub fn parse_database(source: &str, project_root: &Path) -> Result<CompileDatabase, serde_json::Error> {
    let records: Vec<RawRecord> = serde_json::from_str(source)?;
    let mut database = CompileDatabase::with_capacity(records.len());

    for record in records {
        let Some(file) = record.file.as_deref().filter(|f| !f.is_empty()) else {
            tracing::debug!("skipping compile command without a file");
            continue;
        };
        let Some(command) = record.effective_command() else {
            tracing::debug!("skipping {file}: no command or arguments");
            continue;
        };

        let directory = record
            .directory
            .as_deref()
            .filter(|d| !d.is_empty())
            .map_or_else(|| project_root.to_path_buf(), |d| absolutize(project_root, Path::new(d)));
        let key = canonical_identity(&absolutize(&directory, Path::new(file)));

        database.insert(key, CompileEntry { command, directory });
    }

    Ok(database)
}

/// Read and parse the database file at `path`.
pub async fn load_database(path: &Path, project_root: &Path) -> Result<CompileDatabase, LoadError> {
    let exists = tokio::fs::try_exists(path).await.map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !exists {
        return Err(LoadError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    // Keying canonicalizes every file through the filesystem.
    let root = project_root.to_path_buf();
    let parsed = tokio::task::spawn_blocking(move || parse_database(&source, &root))
        .await
        .map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;

    parsed.map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_record() {
        let db = parse_database(
            r#"[{"directory":"/proj","command":"g++ -I/inc -c a.cpp -o a.o","file":"a.cpp"}]"#,
            Path::new("/other"),
        )
        .unwrap();

        let entry = &db[Path::new("/proj/a.cpp")];
        assert_eq!(entry.command, "g++ -I/inc -c a.cpp -o a.o");
        assert_eq!(entry.directory, PathBuf::from("/proj"));
    }

    #[test]
    fn test_arguments_joined_when_command_missing() {
        let db = parse_database(
            r#"[{"directory":"/proj","arguments":["cc","-I/my dir","-c","b.c"],"file":"/proj/b.c"}]"#,
            Path::new("/proj"),
        )
        .unwrap();

        assert_eq!(db[Path::new("/proj/b.c")].command, r#"cc "-I/my dir" -c b.c"#);
    }

    #[test]
    fn test_directory_defaults_to_project_root() {
        let db = parse_database(r#"[{"command":"cc -c x.c","file":"src/x.c"}]"#, Path::new("/root_dir"))
            .unwrap();

        let entry = &db[Path::new("/root_dir/src/x.c")];
        assert_eq!(entry.directory, PathBuf::from("/root_dir"));
    }

    #[test]
    fn test_relative_directory_resolved_against_root() {
        let db = parse_database(
            r#"[{"directory":"build","command":"cc -c ../x.c","file":"../x.c"}]"#,
            Path::new("/proj"),
        )
        .unwrap();

        let entry = &db[Path::new("/proj/x.c")];
        assert_eq!(entry.directory, PathBuf::from("/proj/build"));
    }

    #[test]
    fn test_invalid_records_skipped() {
        let db = parse_database(
            r#"[
                {"directory":"/p","command":"cc -c a.c"},
                {"directory":"/p","command":"","file":"b.c"},
                {"directory":"/p","arguments":[],"file":"c.c"},
                {"directory":"/p","command":"cc -c d.c","file":""},
                {"directory":"/p","command":"cc -c e.c","file":"e.c"}
            ]"#,
            Path::new("/p"),
        )
        .unwrap();

        assert_eq!(db.len(), 1);
        assert!(db.contains_key(Path::new("/p/e.c")));
    }

    #[test]
    fn test_last_duplicate_wins() {
        let db = parse_database(
            r#"[
                {"directory":"/p","command":"cc -O0 -c a.c","file":"a.c"},
                {"directory":"/p","command":"cc -O2 -c a.c","file":"/p/a.c"}
            ]"#,
            Path::new("/p"),
        )
        .unwrap();

        assert_eq!(db.len(), 1);
        assert_eq!(db[Path::new("/p/a.c")].command, "cc -O2 -c a.c");
    }

    #[test]
    fn test_non_array_is_an_error() {
        assert!(parse_database(r#"{"file":"a.c"}"#, Path::new("/p")).is_err());
        assert!(parse_database("[{", Path::new("/p")).is_err());
        assert!(parse_database(r#"[{"file":42}]"#, Path::new("/p")).is_err());
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_database("[]", Path::new("/p")).unwrap().is_empty());
    }
}
