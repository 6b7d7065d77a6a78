//! Integration tests for the `shadowvault` CLI binary.
//!
//! These tests run the CLI as a subprocess against a throwaway `SQLite`
//! file, verifying exit codes, stdout output, and that state persists
//! across invocations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Helper: locate the `shadowvault` binary built by `cargo test`.
fn shadowvault_bin() -> String {
    let path = env!("CARGO_BIN_EXE_shadowvault");
    assert!(
        Path::new(path).exists(),
        "shadowvault binary not found at {path}"
    );
    path.to_owned()
}

/// Helper: run shadowvault with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(shadowvault_bin())
        .args(args)
        .env_remove("SHADOWVAULT_PASSWORD")
        .env_remove("SHADOWVAULT_DB")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute shadowvault");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

/// Helper: run a vault command against `db` with `password`, asserting success.
fn vault(db: &Path, password: &str, args: &[&str]) -> String {
    let db = db.to_str().unwrap();
    let mut full = vec!["--db", db, "--password", password];
    full.extend_from_slice(args);
    let (code, stdout, stderr) = run(&full);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn temp_db() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("vault.db");
    (dir, db)
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0, "shadowvault --version should exit 0");
    assert!(
        stdout.contains("shadowvault"),
        "version output should contain 'shadowvault': {stdout}"
    );
}

#[test]
fn test_help_lists_commands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0, "shadowvault --help should exit 0");
    for command in [
        "list",
        "add",
        "read",
        "delete",
        "set-owner-secret",
        "verify-owner",
        "whoami",
    ] {
        assert!(stdout.contains(command), "help should list '{command}'");
    }
}

#[test]
fn test_missing_password_fails() {
    let (code, _, stderr) = run(&["--db", ":memory:", "list"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--password"), "stderr: {stderr}");
}

#[test]
fn test_unknown_command_fails() {
    let (code, _, _) = run(&["--password", "x", "frobnicate"]);
    assert_ne!(code, 0);
}

// ── Vault operations ─────────────────────────────────────────────────

#[test]
fn test_add_read_list_delete() {
    let (_dir, db) = temp_db();

    assert_eq!(vault(&db, "alpha", &["list"]), "");
    vault(&db, "alpha", &["add", "Mail", "me", "pw1"]);
    vault(&db, "alpha", &["add", "Bank", "acct", "pw2"]);

    assert_eq!(vault(&db, "alpha", &["list"]), "Bank\nMail\n");

    let read = vault(&db, "alpha", &["read", "Mail"]);
    assert!(read.contains("username: me"), "read: {read}");
    assert!(read.contains("password: pw1"), "read: {read}");

    vault(&db, "alpha", &["delete", "Mail"]);
    assert_eq!(vault(&db, "alpha", &["list"]), "Bank\n");
}

#[test]
fn test_read_missing_entry_fails() {
    let (_dir, db) = temp_db();
    let db = db.to_str().unwrap();
    let (code, _, stderr) = run(&["--db", db, "--password", "alpha", "read", "Nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Nope"), "stderr: {stderr}");
}

#[test]
fn test_second_password_opens_mirrored_decoy() {
    let (_dir, db) = temp_db();

    vault(&db, "alpha", &["add", "Mail", "me", "pw1"]);
    assert_eq!(vault(&db, "alpha", &["whoami"]).trim(), "1");

    assert_eq!(vault(&db, "beta", &["whoami"]).trim(), "2");
    assert_eq!(vault(&db, "beta", &["list"]), "Mail\n");

    let fake = vault(&db, "beta", &["--json", "read", "Mail"]);
    let fake: serde_json::Value = serde_json::from_str(&fake).unwrap();
    assert_ne!(fake["username"], "me");
    assert_ne!(fake["password"], "pw1");
    assert!(fake["username"].as_str().unwrap().starts_with("user_mail_"));
}

#[test]
fn test_owner_secret_proves_real_vault() {
    let (_dir, db) = temp_db();

    vault(&db, "alpha", &["set-owner-secret", "s1"]);
    assert_eq!(vault(&db, "alpha", &["verify-owner", "s1"]).trim(), "verified");
    assert_eq!(
        vault(&db, "alpha", &["verify-owner", "s2"]).trim(),
        "not verified"
    );

    let decoy = vault(&db, "beta", &["--json", "verify-owner", "s1"]);
    let decoy: serde_json::Value = serde_json::from_str(&decoy).unwrap();
    assert_eq!(decoy["is_real"], false);
}

#[test]
fn test_json_list_output() {
    let (_dir, db) = temp_db();
    vault(&db, "alpha", &["add", "Mail", "me", "pw1"]);

    let out = vault(&db, "alpha", &["--json", "list"]);
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value, serde_json::json!({ "services": ["Mail"] }));
}

#[test]
fn test_memory_store_does_not_persist() {
    let out = {
        let (code, stdout, stderr) = run(&[
            "--db", ":memory:", "--password", "alpha", "add", "Mail", "me", "pw1",
        ]);
        assert_eq!(code, 0, "stderr: {stderr}");
        stdout
    };
    assert!(out.contains("stored Mail"));

    let (code, stdout, _) = run(&["--db", ":memory:", "--password", "alpha", "list"]);
    assert_eq!(code, 0);
    assert_eq!(stdout, "");
}

#[test]
fn test_sqlite_url_reaches_same_file_as_path() {
    let (_dir, db) = temp_db();
    let url = format!("sqlite://{}", db.to_str().unwrap());

    let (code, _, stderr) = run(&[
        "--db", &url, "--password", "alpha", "add", "Mail", "me", "pw1",
    ]);
    assert_eq!(code, 0, "stderr: {stderr}");

    assert_eq!(vault(&db, "alpha", &["list"]), "Mail\n");
}
