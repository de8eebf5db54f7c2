//! Integration tests for project sessions.

use iwyu_assist::{Session, SessionError, Settings};
use iwyu_compdb::DbStatus;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    (dir, root)
}

fn write_db(dir: &Path, command: &str) {
    let json = serde_json::json!([{
        "directory": dir.join("build"),
        "command": command,
        "file": "../src/a.cpp",
    }]);
    std::fs::write(dir.join("compile_commands.json"), json.to_string()).unwrap();
}

#[tokio::test]
async fn test_missing_database_is_reported() {
    let (_dir, root) = project();
    let session = Session::open(root.clone(), Settings::default(), false);

    let err = session.prepare(Path::new("src/a.cpp")).await.unwrap_err();
    match err {
        SessionError::DatabaseInvalid { path, status } => {
            assert_eq!(path, Some(root.join("compile_commands.json")));
            assert_eq!(status, DbStatus::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_file_without_entry() {
    let (_dir, root) = project();
    write_db(&root, "g++ -c ../src/a.cpp");
    let session = Session::open(root, Settings::default(), false);

    let err = session.prepare(Path::new("src/b.cpp")).await.unwrap_err();
    assert!(matches!(err, SessionError::NoEntryForFile { .. }));
    assert_eq!(err.to_string(), "no compile command found for src/b.cpp");
}

#[tokio::test]
async fn test_prepare_builds_both_invocations() {
    let (_dir, root) = project();
    write_db(&root, r#""clang-cl.exe" /c /Yupch.h /Fopch.obj -DX ../src/a.cpp"#);
    let settings = Settings {
        iwyu_path: PathBuf::from("/opt/iwyu/bin/include-what-you-use"),
        mapping_files: vec!["qt.imp".to_string()],
        fix_reorder: false,
        ..Settings::default()
    };
    let session = Session::open(root.clone(), settings, false);

    let prepared = session.prepare(&root.join("src/a.cpp")).await.unwrap();
    let build = root.join("build");

    assert_eq!(prepared.entry.directory, build);
    assert_eq!(
        prepared.analysis.program,
        PathBuf::from("/opt/iwyu/bin/include-what-you-use")
    );
    assert_eq!(prepared.analysis.cwd, build);
    assert_eq!(
        prepared.analysis.args,
        vec![
            "-Xiwyu".to_string(),
            format!("--mapping_file={}", root.join("qt.imp").display()),
            "-Xiwyu".to_string(),
            "--pch_in_code".to_string(),
            "--driver-mode=cl".to_string(),
            "-DX".to_string(),
            "../src/a.cpp".to_string(),
        ]
    );

    assert_eq!(prepared.fix.program, PathBuf::from("fix_includes.py"));
    assert_eq!(prepared.fix.cwd, build);
    assert_eq!(
        prepared.fix.args,
        vec![
            "--safe_headers".to_string(),
            "--comments".to_string(),
            "--noreorder".to_string(),
            format!("--basedir={}", build.display()),
        ]
    );
}

#[tokio::test]
async fn test_apply_settings_moves_database() {
    let (_dir, root) = project();
    std::fs::create_dir(root.join("out")).unwrap();
    write_db(&root.join("out"), "cc -c ../src/a.cpp");
    let mut session = Session::open(root.clone(), Settings::default(), false);
    assert!(!session.cache().is_valid().await);

    session.apply_settings(Settings {
        compile_commands: PathBuf::from("out"),
        ..Settings::default()
    });

    assert_eq!(
        session.cache().database_path(),
        Some(root.join("out").join("compile_commands.json"))
    );
    let prepared = session
        .prepare(&root.join("out/src/a.cpp"))
        .await
        .unwrap();
    assert_eq!(prepared.analysis.args, vec!["../src/a.cpp"]);
}

#[tokio::test]
async fn test_apply_settings_without_database_change_keeps_cache() {
    let (_dir, root) = project();
    write_db(&root, "cc -c ../src/a.cpp");
    let mut session = Session::open(root.clone(), Settings::default(), false);
    assert!(session.cache().is_valid().await);

    session.apply_settings(Settings {
        iwyu_args: vec!["--no_fwd_decls".to_string()],
        ..Settings::default()
    });

    let prepared = session.prepare(&root.join("src/a.cpp")).await.unwrap();
    assert_eq!(
        prepared.analysis.args,
        vec!["-Xiwyu", "--no_fwd_decls", "../src/a.cpp"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_pipes_analysis_into_fix() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, root) = project();
    std::fs::create_dir(root.join("build")).unwrap();
    write_db(&root, "cc -c ../src/a.cpp");
    // Stands in for fix_includes.py: ignores its flags, echoes stdin.
    let fix_script = root.join("fix.sh");
    std::fs::write(&fix_script, "#!/bin/sh\ncat\n").unwrap();
    std::fs::set_permissions(&fix_script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let settings = Settings {
        iwyu_path: PathBuf::from("echo"),
        fix_includes_path: fix_script,
        ..Settings::default()
    };
    let session = Session::open(root.clone(), settings, false);

    let report = session.run(&root.join("src/a.cpp"), true).await.unwrap();
    assert_eq!(report.analysis.text, "../src/a.cpp\n");
    let fix = report.fix.expect("fix output");
    assert_eq!(fix.text, "../src/a.cpp\n");

    let report = session.run(&root.join("src/a.cpp"), false).await.unwrap();
    assert!(report.fix.is_none());
}
