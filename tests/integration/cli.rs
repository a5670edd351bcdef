//! Binary-level tests for the CLI commands

use assert_cmd::Command;
use tempfile::TempDir;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("solana-transfers-ingest").unwrap();
    for var in [
        "LOW_TS",
        "HIGH_TS",
        "DB_FILE",
        "PARQUET_FILE",
        "API_KEY_FILE",
        "API_URL",
        "RUST_LOG",
        "LOG_FORMAT",
        "PAGE_SIZE",
        "MAX_CONCURRENT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_ingest_without_bounds_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = bin()
        .current_dir(temp_dir.path())
        .env("HIGH_TS", "2024-01-02")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let logs = String::from_utf8_lossy(&output.stdout);
    assert!(logs.contains("Please provide a low and high timestamp"));
    // Nothing was written before validation failed
    assert!(!temp_dir.path().join("solana.duckdb").exists());
}

#[test]
fn test_ingest_with_inverted_bounds_fails() {
    let temp_dir = TempDir::new().unwrap();

    bin()
        .current_dir(temp_dir.path())
        .args(["ingest", "--low-ts", "2024-01-02", "--high-ts", "2024-01-01"])
        .assert()
        .failure();
}

#[test]
fn test_ingest_without_api_key_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    bin()
        .current_dir(temp_dir.path())
        .env("LOW_TS", "2024-01-01")
        .env("HIGH_TS", "2024-01-01 01:00:00")
        .assert()
        .failure();
}

#[test]
fn test_invalid_concurrency_is_rejected() {
    bin()
        .args(["ingest", "--max-concurrent", "0"])
        .assert()
        .failure();
}

#[test]
fn test_init_then_verify() {
    let temp_dir = TempDir::new().unwrap();
    let db_file = temp_dir.path().join("solana.duckdb");
    let db_arg = db_file.to_str().unwrap();

    bin().args(["init", "--db-file", db_arg]).assert().success();
    assert!(db_file.exists());

    let output = bin()
        .args(["verify", "--db-file", db_arg])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Rows: 0"));

    let output = bin()
        .args(["verify", "--db-file", db_arg, "--format", "json"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["table"], "transfers");
    assert_eq!(json["summary"]["row_count"], 0);
}

#[test]
fn test_store_commands_ignore_ingest_settings() {
    let temp_dir = TempDir::new().unwrap();
    let db_file = temp_dir.path().join("solana.duckdb");
    let db_arg = db_file.to_str().unwrap();

    bin()
        .env("MAX_CONCURRENT", "0")
        .env("PAGE_SIZE", "0")
        .args(["init", "--db-file", db_arg])
        .assert()
        .success();

    bin()
        .env("MAX_CONCURRENT", "not-a-number")
        .args(["verify", "--db-file", db_arg])
        .assert()
        .success();

    // Without a subcommand the same settings are still validated
    bin()
        .current_dir(temp_dir.path())
        .env("MAX_CONCURRENT", "0")
        .assert()
        .failure();
}
