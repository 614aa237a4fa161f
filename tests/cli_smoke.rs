use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn bin() -> String {
    // Cargo sets this for bin targets in integration tests
    env!("CARGO_BIN_EXE_susa").to_string()
}

fn write(dir: &Path, name: &str, src: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, src).unwrap();
    path
}

fn susa(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(bin())
        .arg("--no-color")
        .args(args)
        .env("SUSA_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn susa");
    child.stdin.take().unwrap().write_all(stdin.as_bytes()).unwrap();
    child.wait_with_output().expect("run")
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

#[test]
fn run_prints_program_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "sum.susa", "let x = 2\nlet y = 3\nPRINT x + y\n");
    let out = susa(&["run", input.to_str().unwrap()], "");
    assert!(out.status.success(), "stderr:\n{}", text(&out.stderr));
    assert_eq!(text(&out.stdout), "5\n");
}

#[test]
fn run_answers_input_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "hi.susa", "let name = INPUT(\"who? \")\nPRINT \"hi \" + name\n");
    let out = susa(&["run", input.to_str().unwrap()], "Ada\n");
    assert!(out.status.success(), "stderr:\n{}", text(&out.stderr));
    assert_eq!(text(&out.stdout), "who? hi Ada\n");
}

#[test]
fn run_with_breakpoint_reads_debugger_commands() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "loop.susa", "LOOP i = 0 FOR 3 TIMES:\n  PRINT i\nEND\n");
    let out = susa(&["run", input.to_str().unwrap(), "-b", "2:i > 0"], "c\nc\n");
    assert!(out.status.success(), "stderr:\n{}", text(&out.stderr));
    assert_eq!(text(&out.stdout), "0\n1\n2\n");
    let err = text(&out.stderr);
    assert_eq!(err.matches("paused (breakpoint)").count(), 2, "stderr:\n{}", err);
}

#[test]
fn runtime_error_exits_nonzero_with_location() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "div.susa", "PRINT 1\nPRINT 1 / 0\n");
    let out = susa(&["run", input.to_str().unwrap()], "");
    assert!(!out.status.success());
    assert_eq!(text(&out.stdout), "1\n");
    let err = text(&out.stderr);
    assert!(err.contains("Division by zero"), "stderr:\n{}", err);
    assert!(err.contains("div.susa:2:"), "stderr:\n{}", err);
}

#[test]
fn check_reports_all_errors() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(dir.path(), "good.susa", "let a = 1\nPRINT a\n");
    let out = susa(&["check", good.to_str().unwrap()], "");
    assert!(out.status.success());

    let bad = write(dir.path(), "bad.susa", "PRINT \"abc\nlet = 1\n");
    let out = susa(&["check", bad.to_str().unwrap()], "");
    assert!(!out.status.success());
    let err = text(&out.stderr);
    assert!(err.contains("Unterminated string"), "stderr:\n{}", err);
    assert!(err.contains("bad.susa:1:7"), "stderr:\n{}", err);
    assert!(err.contains("Expected variable name after LET"), "stderr:\n{}", err);
    assert!(err.contains("2 error(s)"), "stderr:\n{}", err);
}

#[test]
fn tokens_and_ast_dumps() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "t.susa", "let a = 1 # one\n");

    let out = susa(&["tokens", input.to_str().unwrap()], "");
    assert!(out.status.success());
    let dump = text(&out.stdout);
    assert!(dump.starts_with("Keyword(LET) @1:1\nIdentifier('a') @1:5"), "{}", dump);
    assert!(!dump.contains("Comment"));

    let out = susa(&["tokens", "--trivia", input.to_str().unwrap()], "");
    assert!(text(&out.stdout).contains("Comment(\"# one\") @1:11"));

    let out = susa(&["ast", input.to_str().unwrap()], "");
    assert!(out.status.success());
    let ast: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json ast");
    assert_eq!(ast["statements"].as_array().map(|s| s.len()), Some(1));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "a.susa", "PRINT 1\n");
    let missing = dir.path().join("nope.toml");
    let out = susa(&["--config", missing.to_str().unwrap(), "run", input.to_str().unwrap()], "");
    assert!(!out.status.success());
    assert!(text(&out.stdout).is_empty());
}

#[test]
fn config_file_limits_loops() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "susa.toml", "max_loop_iterations = 5\n");
    let input = write(dir.path(), "w.susa", "WHILE true:\n  PRINT 1\nEND\n");
    let out = susa(&["--config", cfg.to_str().unwrap(), "run", input.to_str().unwrap()], "");
    assert!(!out.status.success());
    assert_eq!(text(&out.stdout).lines().count(), 5);
    assert!(text(&out.stderr).contains("Loop exceeded iteration limit of 5"));
}
