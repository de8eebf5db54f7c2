//! Compiler invocation translation for include-what-you-use.
//!
//! This crate turns the raw compiler command recorded in a compilation
//! database into the argument list expected by `include-what-you-use`:
//!
//! - Tokenizes the command line with lenient quote handling
//! - Drops the compiler executable, compilation-mode and output flags
//! - Drops precompiled header and forced include flags, switching IWYU into
//!   `--pch_in_code` mode when any were present
//! - Prepends `--driver-mode=cl` for `clang-cl` style compilers
//! - Injects mapping files and extra IWYU flags via `-Xiwyu`
//!
//! Translation never fails: malformed input degrades to a best-effort
//! token list.
//!
//! # Example
//!
//! ```
//! use iwyu_translate::{translate, TranslateOptions};
//!
//! let options = TranslateOptions::new("/proj");
//! let args = translate("g++ -I/inc -c a.cpp -o a.o", &options);
//! assert_eq!(args, vec!["-I/inc", "a.cpp"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod filter;
mod tokenize;

pub use filter::{
    filter_compiler_flags, filter_flags, is_msvc_driver, FilteredFlags, DRIVER_MODE_FLAG,
};
pub use tokenize::{join_command, tokenize};

use std::path::{Path, PathBuf};

/// Prefix passing the following flag through the compiler driver to IWYU.
pub const IWYU_PASSTHROUGH: &str = "-Xiwyu";

/// IWYU flag enabling precompiled-header-aware analysis.
pub const PCH_IN_CODE_FLAG: &str = "--pch_in_code";

/// User configuration consumed by [`translate`].
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Directory relative mapping file paths are resolved against.
    pub project_root: PathBuf,
    /// IWYU mapping (`.imp`) files.
    pub mapping_files: Vec<String>,
    /// Extra flags passed to IWYU, each behind its own `-Xiwyu`.
    pub iwyu_args: Vec<String>,
}

impl TranslateOptions {
    /// Create options with no mapping files or extra flags.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Add mapping files.
    #[must_use]
    pub fn with_mapping_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mapping_files.extend(files.into_iter().map(Into::into));
        self
    }

    /// Add extra IWYU flags.
    #[must_use]
    pub fn with_iwyu_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iwyu_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Resolve a configured mapping file to an absolute path string.
    fn resolve_mapping_file(&self, file: &str) -> String {
        let unquoted = file.replace('"', "");
        let path = Path::new(&unquoted);
        if path.is_absolute() {
            unquoted
        } else {
            self.project_root.join(path).display().to_string()
        }
    }
}

/// Translate a raw compiler invocation into IWYU arguments.
///
/// The result starts with the IWYU-specific flags (mapping files, extra
/// flags, `--pch_in_code` when needed) followed by the cleaned compiler
/// flags in their original order. Later flags take precedence in the
/// compiler driver, so this order must be kept.
pub fn translate(command: &str, options: &TranslateOptions) -> Vec<String> {
    let filtered = filter_flags(tokenize(command));
    assemble(filtered, options)
}

/// Assemble the final argument list from already filtered flags.
pub fn assemble(filtered: FilteredFlags, options: &TranslateOptions) -> Vec<String> {
    let mut args = Vec::with_capacity(
        2 * (options.mapping_files.len() + options.iwyu_args.len() + 1) + filtered.flags.len(),
    );

    for file in &options.mapping_files {
        args.push(IWYU_PASSTHROUGH.to_string());
        args.push(format!(
            "--mapping_file={}",
            options.resolve_mapping_file(file)
        ));
    }

    for flag in &options.iwyu_args {
        args.push(IWYU_PASSTHROUGH.to_string());
        args.push(flag.clone());
    }

    if filtered.pch_in_use {
        args.push(IWYU_PASSTHROUGH.to_string());
        args.push(PCH_IN_CODE_FLAG.to_string());
    }

    args.extend(filtered.flags);
    args
}
