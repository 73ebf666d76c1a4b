use std::fs;
use std::path::Path;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use tempfile::TempDir;

fn opnpool(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opnpool"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run opnpool")
}

fn copy_header(dir: &TempDir) -> String {
    let header = dir.path().join("opnpool_ids.h");
    fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("component/core/opnpool_ids.h"),
        &header,
    )
    .unwrap();
    header.to_string_lossy().to_string()
}

#[test]
fn test_no_arguments_syncs_shipped_header() {
    let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("component/core/opnpool_ids.h");
    let before = fs::read(&shipped).unwrap();

    let output = opnpool(&[]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read(&shipped).unwrap(), before);
    assert!(String::from_utf8_lossy(&output.stderr).contains("is up to date"));
}

#[test]
fn test_check_in_sync() {
    let dir = TempDir::new().unwrap();
    let header = copy_header(&dir);

    let output = opnpool(&["check", "--header", &header]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("switch_id_t"));
    assert!(stdout.contains("in sync"));
}

#[test]
fn test_check_drift_exits_non_zero_and_sync_fixes_it() {
    let dir = TempDir::new().unwrap();
    let header = copy_header(&dir);
    let content = fs::read_to_string(&header).unwrap();
    fs::write(&header, content.replace("    MODE_TIMEOUT = 4,\n", "")).unwrap();

    let output = opnpool(&["check", "--header", &header, "--json"]);
    assert!(!output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    let categories = report["categories"].as_array().unwrap();
    let binary = categories
        .iter()
        .find(|entry| entry[0] == "binary_sensor")
        .unwrap();
    assert_eq!(binary[1]["status"], "out_of_sync");

    let output = opnpool(&["sync", "--header", &header]);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&header).unwrap(), content);

    assert!(opnpool(&["check", "--header", &header]).status.success());
}

#[test]
fn test_sync_missing_header_fails() {
    let dir = TempDir::new().unwrap();
    let header = dir.path().join("missing.h");

    let output = opnpool(&["sync", "--header", &header.to_string_lossy()]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to synchronize"));
}

#[test]
fn test_generate_writes_files() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("opnpool.toml");
    fs::write(&config, "flash_size = \"16MB\"\n[entities.spa]\nname = \"Hot Tub\"\n").unwrap();
    let out = dir.path().join("out");

    let output = opnpool(&[
        "generate",
        "--config",
        &config.to_string_lossy(),
        "--out",
        &out.to_string_lossy(),
        "--host-version",
        "2025.12.0",
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let setup = fs::read_to_string(out.join("opnpool_setup.cpp")).unwrap();
    assert!(setup.contains("spa->set_name(\"Hot Tub\");"));
    let ini = fs::read_to_string(out.join("platformio_opnpool.ini")).unwrap();
    assert!(ini.contains("board_upload.maximum_size = 16777216"));
}

#[test]
fn test_generate_reports_config_errors() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("opnpool.toml");
    fs::write(&config, "[entities.hot_tub]\nname = \"Hot Tub\"\n").unwrap();
    let out = dir.path().join("out");

    let output = opnpool(&[
        "generate",
        "--config",
        &config.to_string_lossy(),
        "--out",
        &out.to_string_lossy(),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("'hot_tub' is not an OPNpool entity"));
    assert!(!out.exists());
}
