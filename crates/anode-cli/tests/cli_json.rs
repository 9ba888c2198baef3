//! Integration tests for the `anode` binary.

use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-q", "-p", "anode-cli", "--bin", "anode", "--"]);
    cmd
}

#[test]
fn test_externals_json_is_valid_json() {
    let output = cargo_bin()
        .args(["--json", "externals"])
        .output()
        .expect("Failed to run externals command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be valid JSON");

    assert_eq!(json["ok"], true);
    let externals: Vec<&str> = json["externals"]
        .as_array()
        .expect("externals should be an array")
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(json["count"].as_u64(), Some(externals.len() as u64));

    for id in ["electron", "fs", "path", "node:fs", "node:path", "child_process"] {
        assert!(externals.contains(&id), "missing {id}");
    }
    assert!(!externals.contains(&"node:electron"));
    assert!(!externals.iter().any(|id| id.starts_with('_')));
}

#[test]
fn test_version_output() {
    let output = cargo_bin()
        .arg("version")
        .output()
        .expect("Failed to run version command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("anode "), "unexpected output: {stdout}");
}

#[test]
fn test_dev_rejects_malformed_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("anode.config.json"), "{ not json").unwrap();

    let output = cargo_bin()
        .arg("--cwd")
        .arg(dir.path())
        .args(["dev", "--port", "0"])
        .output()
        .expect("Failed to run dev command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CONFIG_PARSE"), "stderr: {stderr}");
    assert!(stderr.contains("--config"), "stderr: {stderr}");
}
