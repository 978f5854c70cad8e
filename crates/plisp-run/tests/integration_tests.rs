use std::io::Write;
use std::{fs::File, path::PathBuf};

use assert_cmd::cargo;
use rstest::rstest;
use scopeguard::defer;

const FIB: &str = "(defun fib (n)\n  (if (< n 2)\n      n\n      (+ (fib (- n 1)) (fib (- n 2)))))\n(fib 10)\n";

pub fn create_file(name: &str, content: &str) -> PathBuf {
    let temp_file_path = std::env::temp_dir().join(name);
    let mut file = File::create(&temp_file_path).expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");

    temp_file_path
}

#[rstest]
#[case::expression(vec!["-e", "(+ 1 2)"], "3\n")]
#[case::forms(vec!["-e", "(defun f (x) (+ x 1)) (f 41)"], "f\n42\n")]
#[case::booleans(vec!["-e", "(< 1 2) (> 1 2)"], "T\nNil\n")]
#[case::print(vec!["-e", "(print 7)"], "7\n7\n")]
#[case::one_worker(vec!["--workers", "1", "-e", "(defun five () 5) (+ (five) 10)"], "five\n15\n")]
#[case::shared_queue(
    vec!["--scheduler", "shared-queue", "-e", "(defun five () 5) (+ (five) 10)"],
    "five\n15\n"
)]
#[case::empty_pool(vec!["--task-pool-size", "0", "-e", "(defun five () 5) (+ (five) (five))"], "five\n10\n")]
#[case::no_optimize(vec!["--no-optimize", "-i", "0", "-e", "(if nil 10 20)"], "20\n")]
#[case::no_spawn(vec!["--no-spawn", "-e", "(defun sq (x) (* x x)) (+ (sq 3) (sq 4))"], "sq\n25\n")]
fn test_cli_eval(#[case] args: Vec<&str>, #[case] expected: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("plisp");

    cmd.args(args).assert().success().code(0).stdout(expected.to_string());

    Ok(())
}

#[test]
fn test_cli_run_file() -> Result<(), Box<dyn std::error::Error>> {
    let path = create_file("plisp_test_cli_run_file.lisp", FIB);
    let path_clone = path.clone();

    defer! {
        if path_clone.exists() {
            std::fs::remove_file(&path_clone).expect("Failed to delete temp file");
        }
    }

    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    cmd.arg(&path).assert().success().stdout("fib\n55\n");

    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    cmd.arg(&path)
        .args(["-e", "(fib 15)"])
        .assert()
        .success()
        .stdout("fib\n55\n610\n");

    Ok(())
}

#[test]
fn test_cli_error_stops_evaluation() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    let output = cmd.args(["-e", "(+ 1 1) (+ 1 undefined) (+ 2 2)"]).output()?;

    assert!(!output.status.success());
    assert_eq!(String::from_utf8(output.stdout)?, "2\n");
    assert!(String::from_utf8(output.stderr)?.contains("\"undefined\" is not defined"));

    Ok(())
}

#[test]
fn test_cli_runtime_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    let output = cmd.args(["-e", "(/ 10 (- 3 3))"]).output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8(output.stderr)?.contains("Divided by 0"));

    Ok(())
}

#[test]
fn test_cli_missing_file() {
    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    cmd.arg("/nonexistent/plisp/source.lisp").assert().failure();
}

#[test]
fn test_cli_show_ir() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    let output = cmd
        .env_remove("RUST_LOG")
        .args(["--show-ir", "-e", "(defun one () 1)"])
        .output()?;

    assert!(output.status.success());
    assert!(String::from_utf8(output.stderr)?.contains("RETC 1"));

    Ok(())
}

#[test]
fn test_cli_invalid_scheduler() {
    let mut cmd = cargo::cargo_bin_cmd!("plisp");
    cmd.args(["--scheduler", "fifo", "-e", "1"]).assert().failure();
}
