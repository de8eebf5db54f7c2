//! Implementation of the `iwyu-assist` command.

use crate::cmd::completions::{generate_completions, ShellType};
use crate::cmd::watch;
use crate::process::Invocation;
use crate::session::{Session, SessionError};
use crate::settings::{Settings, SettingsLayer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use iwyu_translate::{join_command, translate};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Output format for `args`.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output (default)
    #[default]
    Text,
    /// JSON output for IDE/tooling integration
    Json,
}

/// Run include-what-you-use on files from a compilation database.
#[derive(Parser, Debug)]
#[command(name = "iwyu-assist")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Options shared by all subcommands
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by all subcommands; they override the settings files.
#[derive(clap::Args, Debug, Default)]
pub struct GlobalArgs {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// The compile_commands.json file, or the directory containing it
    #[arg(long, global = true, value_name = "PATH")]
    pub compile_commands: Option<PathBuf>,

    /// The include-what-you-use executable
    #[arg(long, global = true, value_name = "PATH")]
    pub iwyu: Option<PathBuf>,

    /// The fix_includes.py script
    #[arg(long, global = true, value_name = "PATH")]
    pub fix_includes: Option<PathBuf>,

    /// IWYU mapping file (can be specified multiple times)
    #[arg(long = "mapping-file", global = true, value_name = "FILE")]
    pub mapping_files: Vec<String>,

    /// Extra IWYU flag, e.g. `--iwyu-arg=--no_fwd_decls` (can be repeated)
    #[arg(
        long = "iwyu-arg",
        global = true,
        value_name = "FLAG",
        allow_hyphen_values = true
    )]
    pub iwyu_args: Vec<String>,

    /// Extra fix_includes.py flag (can be repeated)
    #[arg(
        long = "fix-arg",
        global = true,
        value_name = "FLAG",
        allow_hyphen_values = true
    )]
    pub fix_args: Vec<String>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    /// The settings layer formed by the command-line flags.
    pub fn settings_layer(&self) -> SettingsLayer {
        let list = |values: &[String]| (!values.is_empty()).then(|| values.to_vec());
        SettingsLayer {
            iwyu_path: self.iwyu.clone(),
            fix_includes_path: self.fix_includes.clone(),
            compile_commands: self.compile_commands.clone(),
            mapping_files: list(&self.mapping_files),
            iwyu_args: list(&self.iwyu_args),
            fix_args: list(&self.fix_args),
            ..SettingsLayer::default()
        }
    }
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a file and apply the suggested include changes
    Run {
        /// The source file to analyze
        file: PathBuf,
        /// Only print the analysis, do not run fix_includes.py
        #[arg(long)]
        no_fix: bool,
    },

    /// Print the analysis and fix invocations for a file without running them
    Args {
        /// The source file
        file: PathBuf,
        /// Output format (text or json)
        #[arg(long, short = 'f', value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Translate a raw compiler command into include-what-you-use arguments
    Translate {
        /// The compiler command line
        #[arg(
            required = true,
            num_args = 1..,
            allow_hyphen_values = true,
            trailing_var_arg = true
        )]
        command: Vec<String>,
    },

    /// Show the state of the compilation database
    Status,

    /// Keep the compilation database live and report every change
    Watch,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        shell: ShellType,
    },
}

/// Main entry point for the `iwyu-assist` command.
pub fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("error: {e:#}");
        return ExitCode::from(2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.global.verbose {
        LevelFilter::DEBUG
    } else if args.global.log_file.is_some() || matches!(args.command, Command::Watch) {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if let Some(path) = &args.global.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(io::stderr).init();
    }
    Ok(())
}

fn project_root(global: &GlobalArgs) -> Result<PathBuf> {
    let root = match &global.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to determine the current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("project root {} not found", root.display()))
}

/// Load the settings files and apply the command-line overrides.
pub(crate) fn load_settings(root: &Path, overrides: &SettingsLayer) -> Result<Settings> {
    let mut settings = Settings::load(root)?;
    settings.apply(overrides.clone());
    Ok(settings)
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut stdout = io::stdout();

    if let Command::Completions { shell } = args.command {
        generate_completions::<Args>(shell, "iwyu-assist");
        return Ok(ExitCode::SUCCESS);
    }

    let root = project_root(&args.global)?;
    let overrides = args.global.settings_layer();
    let settings = load_settings(&root, &overrides)?;
    tracing::debug!(root = %root.display(), ?settings, "settings loaded");

    match args.command {
        Command::Run { file, no_fix } => {
            let session = Session::open(root, settings, false);
            cmd_run(&session, &file, !no_fix, &mut stdout).await
        }
        Command::Args { file, format } => {
            let session = Session::open(root, settings, false);
            cmd_args(&session, &file, format, &mut stdout).await
        }
        Command::Translate { command } => cmd_translate(&root, &settings, &command, &mut stdout),
        Command::Status => {
            let session = Session::open(root, settings, false);
            cmd_status(&session, &mut stdout).await
        }
        Command::Watch => watch::run(root, settings, overrides, &mut stdout).await,
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Turn a user-facing session failure into exit code 1.
fn session_failure(e: SessionError) -> Result<ExitCode> {
    match e {
        SessionError::DatabaseInvalid { .. } | SessionError::NoEntryForFile { .. } => {
            eprintln!("{e}");
            Ok(ExitCode::from(1))
        }
        SessionError::Process(e) => Err(e.into()),
    }
}

async fn cmd_run<W: Write>(
    session: &Session,
    file: &Path,
    fix: bool,
    writer: &mut W,
) -> Result<ExitCode> {
    let report = match session.run(file, fix).await {
        Ok(report) => report,
        Err(e) => return session_failure(e),
    };

    write!(writer, "{}", report.analysis.text)?;
    if let Some(fix) = &report.fix {
        writeln!(writer, "{}", "=".repeat(60))?;
        write!(writer, "{}", fix.text)?;
        tracing::info!(exit_code = ?fix.exit_code, "fix_includes.py finished");
    }

    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct ArgsOutput<'a> {
    file: &'a Path,
    directory: &'a Path,
    command: &'a str,
    analysis: &'a Invocation,
    fix: &'a Invocation,
}

async fn cmd_args<W: Write>(
    session: &Session,
    file: &Path,
    format: OutputFormat,
    writer: &mut W,
) -> Result<ExitCode> {
    let prepared = match session.prepare(file).await {
        Ok(prepared) => prepared,
        Err(e) => return session_failure(e),
    };

    match format {
        OutputFormat::Text => {
            writeln!(writer, "file:      {}", prepared.file.display())?;
            writeln!(writer, "directory: {}", prepared.entry.directory.display())?;
            writeln!(writer, "command:   {}", prepared.entry.command)?;
            writeln!(writer, "analysis:  {}", prepared.analysis.command_line())?;
            writeln!(writer, "fix:       {}", prepared.fix.command_line())?;
        }
        OutputFormat::Json => {
            let output = ArgsOutput {
                file: &prepared.file,
                directory: &prepared.entry.directory,
                command: &prepared.entry.command,
                analysis: &prepared.analysis,
                fix: &prepared.fix,
            };
            serde_json::to_writer_pretty(&mut *writer, &output)?;
            writeln!(writer)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_translate<W: Write>(
    root: &Path,
    settings: &Settings,
    command: &[String],
    writer: &mut W,
) -> Result<ExitCode> {
    // A single argument is a whole command line; several are already split.
    let command = match command {
        [single] => single.clone(),
        parts => join_command(parts),
    };
    let args = translate(&command, &settings.translate_options(root));
    writeln!(writer, "{}", join_command(&args))?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status<W: Write>(session: &Session, writer: &mut W) -> Result<ExitCode> {
    let status = session.cache().status().await;
    let entries = session.cache().snapshot().await.len();
    let path = session
        .cache()
        .database_path()
        .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());

    writeln!(writer, "database: {path}")?;
    writeln!(writer, "status:   {status}")?;
    writeln!(writer, "entries:  {entries}")?;

    Ok(if session.cache().is_valid().await {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "iwyu-assist",
            "run",
            "a.cpp",
            "--compile-commands",
            "build",
            "--iwyu-arg",
            "--no_fwd_decls",
            "--mapping-file=qt.imp",
        ])
        .unwrap();

        assert!(matches!(args.command, Command::Run { no_fix: false, .. }));
        let layer = args.global.settings_layer();
        assert_eq!(layer.compile_commands, Some(PathBuf::from("build")));
        assert_eq!(layer.iwyu_args, Some(vec!["--no_fwd_decls".to_string()]));
        assert_eq!(layer.mapping_files, Some(vec!["qt.imp".to_string()]));
        assert_eq!(layer.fix_args, None);
    }

    #[test]
    fn test_translate_takes_raw_command() {
        let args =
            Args::try_parse_from(["iwyu-assist", "translate", "cl", "/c", "-DX", "a.cpp"]).unwrap();
        match args.command {
            Command::Translate { command } => assert_eq!(command, vec!["cl", "/c", "-DX", "a.cpp"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cmd_translate_output() {
        let mut out = Vec::new();
        cmd_translate(
            Path::new("/proj"),
            &Settings::default(),
            &[r#""clang-cl.exe" /c /Yc"pch.h" -DFOO=1 a.cpp"#.to_string()],
            &mut out,
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "-Xiwyu --pch_in_code --driver-mode=cl -DFOO=1 a.cpp\n"
        );
    }
}
