//! iwyu-assist - Run include-what-you-use on files from a compilation database.

fn main() -> std::process::ExitCode {
    iwyu_assist::cmd::assist::main()
}
