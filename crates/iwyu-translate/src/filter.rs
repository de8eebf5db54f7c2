//! Removal of build-only flags from a tokenized compiler invocation.

/// Flag prepended when the compiler is an MSVC-compatible clang driver.
pub const DRIVER_MODE_FLAG: &str = "--driver-mode=cl";

/// Substring of the compiler file name that selects the MSVC driver mode.
const MSVC_DRIVER_MARKER: &str = "clang-cl";

/// Compilation-mode markers that mean nothing to the analysis tool.
const MODE_FLAGS: &[&str] = &["--", "-c", "/c"];

/// Precompiled header creation, usage and output file flags.
const PCH_FLAGS: &[&str] = &["/Yc", "/Yu", "/Fp", "-Yc", "-Yu", "-Fp"];

/// Forced include flags.
const FORCED_INCLUDE_FLAGS: &[&str] = &["/FI", "-FI"];

/// Clang's precompiled header include flag, always followed by its file.
const PCH_INCLUDE_FLAG: &str = "-include-pch";

/// Object / output file flags.
const OUTPUT_FLAGS: &[&str] = &["-o", "/Fo", "-Fo"];

/// Compiler flags that survived filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredFlags {
    /// Retained flags in their original order, driver mode flag first.
    pub flags: Vec<String>,
    /// A precompiled header or forced include flag was removed.
    pub pch_in_use: bool,
    /// The compiler is an MSVC-compatible driver.
    pub driver_mode: bool,
}

/// What to do with a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Keep,
    Drop,
    /// Drop the token and the one after it.
    DropWithValue,
}

/// Returns true when the compiler path names an MSVC-compatible driver.
pub fn is_msvc_driver(compiler: &str) -> bool {
    let name = compiler.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(compiler);
    name.to_ascii_lowercase().contains(MSVC_DRIVER_MARKER)
}

/// Strip the compiler executable and all build-only flags.
///
/// The first token is treated as the compiler path. See
/// [`filter_compiler_flags`] for the rules applied to the rest.
pub fn filter_flags<I>(tokens: I) -> FilteredFlags
where
    I: IntoIterator<Item = String>,
{
    let mut tokens = tokens.into_iter();
    let driver_mode = tokens.next().is_some_and(|exe| is_msvc_driver(&exe));

    let mut filtered = filter_compiler_flags(tokens);
    if driver_mode {
        filtered.flags.insert(0, DRIVER_MODE_FLAG.to_string());
        filtered.driver_mode = true;
    }
    filtered
}

/// Strip build-only flags from a list of compiler flags.
///
/// Rules, first match wins for each token:
///
/// 1. `--`, `-c` and `/c` are dropped.
/// 2. Precompiled header flags (`/Yc`, `/Yu`, `/Fp` and their `-` forms)
///    are dropped together with their value.
/// 3. Forced includes (`/FI`, `-FI`) are dropped together with their value.
/// 4. `-include-pch` is dropped together with the following token.
/// 5. Output flags (`-o`, `/Fo`, `-Fo`) are dropped together with their value.
/// 6. Everything else is kept.
///
/// For rules 2, 3 and 5 the value is a separate token only when the flag is
/// spelled exactly; otherwise it is concatenated and nothing more is consumed.
/// Rules 2 and 3 set [`FilteredFlags::pch_in_use`].
pub fn filter_compiler_flags<I>(tokens: I) -> FilteredFlags
where
    I: IntoIterator<Item = String>,
{
    let mut filtered = FilteredFlags::default();
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        match classify(&token, &mut filtered.pch_in_use) {
            Action::Keep => filtered.flags.push(token),
            Action::Drop => {}
            Action::DropWithValue => {
                tokens.next();
            }
        }
    }

    filtered
}

fn classify(token: &str, pch_in_use: &mut bool) -> Action {
    if MODE_FLAGS.contains(&token) {
        return Action::Drop;
    }

    if let Some(action) = prefixed(token, PCH_FLAGS) {
        *pch_in_use = true;
        return action;
    }

    if let Some(action) = prefixed(token, FORCED_INCLUDE_FLAGS) {
        *pch_in_use = true;
        return action;
    }

    if token == PCH_INCLUDE_FLAG {
        return Action::DropWithValue;
    }

    prefixed(token, OUTPUT_FLAGS).unwrap_or(Action::Keep)
}

fn prefixed(token: &str, flags: &[&str]) -> Option<Action> {
    flags.iter().find(|flag| token.starts_with(**flag)).map(|flag| {
        if token.len() == flag.len() {
            Action::DropWithValue
        } else {
            Action::Drop
        }
    })
}
