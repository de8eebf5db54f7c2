//! Splitting of raw compiler invocations into argument tokens.
//!
//! The scanner is deliberately lenient: quoting is a simple toggle and an
//! unterminated quote swallows the rest of the line into the current token
//! instead of producing an error.

/// Split a raw command line into tokens.
///
/// Spaces separate tokens unless they appear inside a double-quoted
/// section. Quote characters are dropped from the emitted token, so
/// `/Fo"out dir/a.obj"` becomes `/Foout dir/a.obj`. Runs of spaces never
/// produce empty tokens.
///
/// # Example
///
/// ```
/// use iwyu_translate::tokenize;
///
/// let tokens = tokenize(r#""C:/Program Files/clang-cl.exe" /c -DFOO=1"#);
/// assert_eq!(tokens, vec!["C:/Program Files/clang-cl.exe", "/c", "-DFOO=1"]);
/// ```
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in command.chars() {
        match ch {
            '"' => quoted = !quoted,
            ' ' if !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Join argument tokens back into a single command line.
///
/// Tokens containing a space are wrapped in double quotes so that
/// [`tokenize`] yields the same sequence again.
pub fn join_command<S: AsRef<str>>(args: &[S]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let arg = arg.as_ref();
        if i > 0 {
            out.push(' ');
        }
        if arg.contains(' ') {
            out.push('"');
            out.push_str(arg);
            out.push('"');
        } else {
            out.push_str(arg);
        }
    }
    out
}
