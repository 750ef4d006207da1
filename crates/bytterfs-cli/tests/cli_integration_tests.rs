//! CLI integration tests
//!
//! These run the built binary with arguments that fail validation, so no
//! btrfs or ssh command is ever reached.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn bytterfs(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bytterfs"))
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Helper script that writes its arguments, one per line, to `notified.txt`
fn recording_helper(dir: &Path) -> (PathBuf, PathBuf) {
    let log = dir.join("notified.txt");
    let script = dir.join("notify.sh");
    fs::write(
        &script,
        format!("#!/bin/sh\nprintf '%s\\n' \"$@\" >> '{}'\n", log.display()),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    (script, log)
}

#[test]
fn test_cli_help_lists_options() {
    let output = bytterfs(&["--help"]);
    assert!(output.status.success());

    let text = String::from_utf8_lossy(&output.stdout);
    for option in ["--port", "--key", "--keep", "--dry-run", "--verbose", "--quiet"] {
        assert!(text.contains(option), "help is missing {}", option);
    }
}

#[test]
fn test_cli_rejects_unsorted_keep() {
    let output = bytterfs(&[
        "rootfs",
        "/",
        "/mnt/backup",
        "/mnt/backup/alpha",
        "backup@nas",
        "--keep",
        "4m=3,5w=6",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("not strictly increasing"));
}

#[test]
fn test_cli_rejects_relative_source() {
    let output = bytterfs(&[
        "rootfs",
        "home",
        "/mnt/backup",
        "/mnt/backup/alpha",
        "backup@nas",
        "--keep",
        "5w=6",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("must be absolute"));
}

#[test]
fn test_cli_requires_keep() {
    let output = bytterfs(&["rootfs", "/", "/mnt/backup", "/mnt/backup/alpha", "backup@nas"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_missing_positionals_is_usage_error() {
    let output = bytterfs(&["rootfs", "/"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Usage"));
}

#[test]
fn test_cli_reads_keep_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("bytterfs.toml");
    fs::write(&config, "keep = \"4m=3,5w=6\"\n").unwrap();

    let output = bytterfs(&[
        "rootfs",
        "/",
        "/mnt/backup",
        "/mnt/backup/alpha",
        "backup@nas",
        "--config",
        config.to_str().unwrap(),
    ]);

    // the file value is used, and validated like a command-line value
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not strictly increasing"));
}

#[test]
fn test_cli_rejects_unknown_config_key() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("bytterfs.toml");
    fs::write(&config, "prot = 2222\n").unwrap();

    let output = bytterfs(&[
        "rootfs",
        "/",
        "/mnt/backup",
        "/mnt/backup/alpha",
        "backup@nas",
        "--keep",
        "5w=6",
        "--config",
        config.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("loading config file"));
}

#[test]
fn test_cli_notifies_configuration_error_once() {
    let temp_dir = TempDir::new().unwrap();
    let (script, log) = recording_helper(temp_dir.path());

    let output = bytterfs(&[
        "rootfs",
        "/",
        "/mnt/backup",
        "/mnt/backup/alpha",
        "backup@nas",
        "--keep",
        "4m=3,5w=6",
        "--notify-command",
        script.to_str().unwrap(),
    ]);
    assert!(!output.status.success());

    let sent = fs::read_to_string(&log).expect("helper was not invoked");
    let lines: Vec<&str> = sent.lines().collect();
    assert_eq!(lines.iter().filter(|l| **l == "-e").count(), 1);
    assert_eq!(lines[1], "error");
    assert_eq!(lines[3], "bytterfs [rootfs]: configuration error");
    assert!(lines[5].contains("ERR_CONFIG"));
}

#[test]
fn test_cli_notify_command_from_config_file_hears_config_errors() {
    let temp_dir = TempDir::new().unwrap();
    let (script, log) = recording_helper(temp_dir.path());
    let config = temp_dir.path().join("bytterfs.toml");
    fs::write(
        &config,
        format!("notify_command = \"{}\"\n", script.display()),
    )
    .unwrap();

    let output = bytterfs(&[
        "rootfs",
        "relative/source",
        "/mnt/backup",
        "/mnt/backup/alpha",
        "backup@nas",
        "--keep",
        "5w=6",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert!(!output.status.success());

    let sent = fs::read_to_string(&log).expect("helper was not invoked");
    assert!(sent.contains("must be absolute"));
}
