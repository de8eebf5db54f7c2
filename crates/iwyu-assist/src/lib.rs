//! include-what-you-use driver.
//!
//! This crate ties the compilation database cache to the command
//! translator and runs the external tools:
//!
//! - `iwyu-assist run FILE`: analyze a file and apply the suggestions
//! - `iwyu-assist args FILE`: print the invocations without running them
//! - `iwyu-assist translate COMMAND`: translate a raw compiler command
//! - `iwyu-assist status`: report the compilation database state
//! - `iwyu-assist watch`: keep the database live and log every change
//!
//! # Example Usage
//!
//! ```bash
//! iwyu-assist run src/main.cpp
//! iwyu-assist --compile-commands build args src/main.cpp --format json
//! iwyu-assist translate 'clang-cl /c /Yupch.h main.cpp'
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cmd;
pub mod process;
pub mod session;
pub mod settings;

pub use process::{Invocation, ProcessError, ProcessOutput};
pub use session::{Prepared, RunReport, Session, SessionError};
pub use settings::{Settings, SettingsError, SettingsLayer};
