//! Spawning include-what-you-use and `fix_includes.py`.

use crate::settings::Settings;
use iwyu_compdb::CompileEntry;
use iwyu_translate::join_command;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors that can occur while running an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        /// The program that failed to start.
        program: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Communication with a running process failed.
    #[error("failed to communicate with {}: {source}", .program.display())]
    Io {
        /// The running program.
        program: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// An executable, its arguments and the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Executable path.
    pub program: PathBuf,
    /// Arguments, not including the program.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Invocation {
    /// A shell-like rendering, for display only.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        join_command(&parts)
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Standard output followed by standard error.
    pub text: String,
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
}

/// The include-what-you-use run for one file.
pub fn analysis_invocation(settings: &Settings, entry: &CompileEntry, args: Vec<String>) -> Invocation {
    Invocation {
        program: settings.iwyu_path.clone(),
        args,
        cwd: entry.directory.clone(),
    }
}

/// The `fix_includes.py` run applying an analysis to the sources.
pub fn fix_invocation(settings: &Settings, entry: &CompileEntry) -> Invocation {
    let mut args = settings.fix_script_args();
    args.push(format!("--basedir={}", entry.directory.display()));
    Invocation {
        program: settings.fix_includes_path.clone(),
        args,
        cwd: entry.directory.clone(),
    }
}

/// Run the analysis and capture its combined output.
///
/// include-what-you-use exits non-zero whenever it has suggestions, so the
/// exit status is reported but never treated as an error.
pub async fn run_analysis(invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
    run(invocation, None).await
}

/// Run the fix script with the analysis output on its standard input.
pub async fn run_fix(invocation: &Invocation, analysis: &str) -> Result<ProcessOutput, ProcessError> {
    run(invocation, Some(analysis.to_string())).await
}

async fn run(invocation: &Invocation, input: Option<String>) -> Result<ProcessOutput, ProcessError> {
    tracing::info!(cwd = %invocation.cwd.display(), "running {}", invocation.command_line());

    let io_error = |source| ProcessError::Io {
        program: invocation.program.clone(),
        source,
    };

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::Spawn {
            program: invocation.program.clone(),
            source: e,
        })?;

    // Feed stdin concurrently so a child that writes before reading cannot
    // deadlock against us.
    let writer = match (input, child.stdin.take()) {
        (Some(input), Some(mut stdin)) => Some(tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        })),
        _ => None,
    };

    let output = child.wait_with_output().await.map_err(io_error)?;

    if let Some(writer) = writer {
        match writer.await {
            Ok(Ok(())) => {}
            // The child may exit without reading everything.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(io_error(e)),
            Err(e) => return Err(io_error(std::io::Error::other(e))),
        }
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    let exit_code = output.status.code();
    tracing::debug!(?exit_code, "{} finished", invocation.program.display());

    Ok(ProcessOutput { text, exit_code })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn entry() -> CompileEntry {
        CompileEntry {
            command: "cc -c a.c".to_string(),
            directory: PathBuf::from("/proj/build"),
        }
    }

    #[test]
    fn test_analysis_invocation_runs_in_entry_directory() {
        let inv = analysis_invocation(&Settings::default(), &entry(), vec!["a.c".to_string()]);
        assert_eq!(inv.program, PathBuf::from("include-what-you-use"));
        assert_eq!(inv.args, vec!["a.c"]);
        assert_eq!(inv.cwd, PathBuf::from("/proj/build"));
    }

    #[test]
    fn test_fix_invocation_sets_basedir() {
        let inv = fix_invocation(&Settings::default(), &entry());
        assert_eq!(inv.program, PathBuf::from("fix_includes.py"));
        assert_eq!(inv.args.last().unwrap(), "--basedir=/proj/build");
        assert!(inv.args.contains(&"--safe_headers".to_string()));
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let inv = Invocation {
            program: PathBuf::from("/opt/my tools/iwyu"),
            args: vec!["-I/inc".to_string()],
            cwd: PathBuf::from("/"),
        };
        assert_eq!(inv.command_line(), r#""/opt/my tools/iwyu" -I/inc"#);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let inv = Invocation {
            program: PathBuf::from("/definitely/not/a/program"),
            args: Vec::new(),
            cwd: std::env::temp_dir(),
        };
        assert!(matches!(
            run_analysis(&inv).await,
            Err(ProcessError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_combined_output() {
        let inv = Invocation {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "echo out; echo err 1>&2; exit 3".to_string()],
            cwd: std::env::temp_dir(),
        };
        let output = run_analysis(&inv).await.unwrap();
        assert_eq!(output.text, "out\nerr\n");
        assert_eq!(output.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fix_receives_analysis_on_stdin() {
        let inv = Invocation {
            program: PathBuf::from("cat"),
            args: Vec::new(),
            cwd: Path::new("/").to_path_buf(),
        };
        let analysis = "a.c should add these lines:\n#include <stdio.h>\n";
        let output = run_fix(&inv, analysis).await.unwrap();
        assert_eq!(output.text, analysis);
        assert_eq!(output.exit_code, Some(0));
    }
}
