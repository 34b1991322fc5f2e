//! Exit codes and output of the `meshmv` binary.

use std::process::Command;

fn meshmv(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_meshmv"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch meshmv")
}

#[test]
fn missing_size_fails() {
    let out = meshmv(&[]);
    assert!(!out.status.success());
    assert!(!out.stderr.is_empty());
}

#[test]
fn size_below_four_fails() {
    let out = meshmv(&["3"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("matrix size"), "stderr: {stderr}");
}

#[test]
fn incompatible_process_count_fails() {
    let out = meshmv(&["5", "--procs", "4"]);
    assert_eq!(out.status.code(), Some(1));
    let out = meshmv(&["6", "--procs", "3"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn successful_run_reports_elapsed_seconds() {
    let out = meshmv(&["4", "--procs", "4", "--print-result"]);
    assert!(out.status.success());

    let stderr = String::from_utf8_lossy(&out.stderr);
    let secs: f64 = stderr.trim().parse().expect("stderr holds one number");
    assert!(secs >= 0.0);

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout, "Index,Value\n0,0\n1,1\n2,2\n3,3\n");
}

#[test]
fn serial_path_prints_same_result() {
    let out = meshmv(&["4", "--serial", "--print-result", "--matrix", "checkerboard"]);
    assert!(out.status.success());
    let distributed = meshmv(&["4", "--print-result", "--matrix", "checkerboard"]);
    assert_eq!(out.stdout, distributed.stdout);
}
