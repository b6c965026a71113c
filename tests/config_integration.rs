// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for configuration loading and merging.
//!
//! Verifies that bridle loads settings from files, environment variables
//! and CLI arguments in the correct priority order, and that the `check`
//! subcommand drives a real server end to end.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// A `bridle` command isolated from the user's config and environment.
fn bridle(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bridle"));
    cmd.env("XDG_CONFIG_HOME", config_home);
    for (key, _) in std::env::vars() {
        if key.starts_with("BRIDLE_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn effective_config(output: &Output) -> Result<Value> {
    assert!(
        output.status.success(),
        "bridle config failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).context("config output is not JSON")
}

fn write_config(dir: &TempDir, contents: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("bridle.toml");
    std::fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn defaults_apply_without_config() -> Result<()> {
    let home = tempfile::tempdir()?;
    let output = bridle(home.path()).arg("config").output()?;
    let config = effective_config(&output)?;

    assert_eq!(config["language_id"], "plaintext");
    assert_eq!(config["protocol_v2_enabled"], true);
    assert_eq!(config["extended_features_enabled"], true);
    assert_eq!(config["server"], serde_json::json!({}));
    Ok(())
}

#[test]
fn explicit_file_is_loaded() -> Result<()> {
    let home = tempfile::tempdir()?;
    let path = write_config(
        &home,
        r#"
language_id = "rust"
protocol_v2_enabled = false

[server.rust]
command = "rust-analyzer"
args = ["--log-file", "/tmp/ra.log"]
"#,
    )?;

    let output = bridle(home.path())
        .arg("--config")
        .arg(&path)
        .arg("config")
        .output()?;
    let config = effective_config(&output)?;

    assert_eq!(config["language_id"], "rust");
    assert_eq!(config["protocol_v2_enabled"], false);
    assert_eq!(config["server"]["rust"]["command"], "rust-analyzer");
    assert_eq!(config["server"]["rust"]["args"][1], "/tmp/ra.log");
    Ok(())
}

#[test]
fn user_config_is_picked_up() -> Result<()> {
    let home = tempfile::tempdir()?;
    let user_dir = home.path().join("bridle");
    std::fs::create_dir_all(&user_dir)?;
    std::fs::write(
        user_dir.join("config.toml"),
        "extended_features_enabled = false\n",
    )?;

    let output = bridle(home.path()).arg("config").output()?;
    let config = effective_config(&output)?;

    assert_eq!(config["extended_features_enabled"], false);
    Ok(())
}

#[test]
fn environment_overrides_file() -> Result<()> {
    let home = tempfile::tempdir()?;
    let path = write_config(&home, "language_id = \"rust\"\n")?;

    let output = bridle(home.path())
        .env("BRIDLE_LANGUAGE_ID", "go")
        .arg("--config")
        .arg(&path)
        .arg("config")
        .output()?;
    let config = effective_config(&output)?;

    assert_eq!(config["language_id"], "go");
    Ok(())
}

#[test]
fn lsp_flag_overrides_configured_server() -> Result<()> {
    let home = tempfile::tempdir()?;
    let path = write_config(
        &home,
        "[server.rust]\ncommand = \"rust-analyzer\"\n",
    )?;

    let output = bridle(home.path())
        .arg("--config")
        .arg(&path)
        .arg("--lsp")
        .arg("rust:ra-multiplex client")
        .arg("config")
        .output()?;
    let config = effective_config(&output)?;

    assert_eq!(config["server"]["rust"]["command"], "ra-multiplex");
    assert_eq!(config["server"]["rust"]["args"], serde_json::json!(["client"]));
    Ok(())
}

#[test]
fn malformed_lsp_flag_is_rejected() -> Result<()> {
    let home = tempfile::tempdir()?;
    let output = bridle(home.path())
        .arg("--lsp")
        .arg("rust-analyzer")
        .arg("config")
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid LSP spec"));
    Ok(())
}

#[test]
fn check_prints_server_diagnostics() -> Result<()> {
    let home = tempfile::tempdir()?;
    let file = home.path().join("main.rs");
    std::fs::write(&file, "fn main() {}\n// TODO: wire it up\n")?;

    let output = bridle(home.path())
        .arg("--lsp")
        .arg(format!("rust:{}", env!("CARGO_BIN_EXE_mockls")))
        .arg("check")
        .arg(&file)
        .arg("--language")
        .arg("rust")
        .arg("--json")
        .output()?;

    assert!(
        output.status.success(),
        "bridle check failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let markers: Value =
        serde_json::from_slice(&output.stdout).context("check output is not JSON")?;
    let markers = markers.as_array().context("markers are not an array")?;
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0]["severity"], "warning");
    assert_eq!(markers[0]["message"], "mockls: unresolved TODO");
    assert_eq!(markers[0]["startLineNumber"], 2);
    assert_eq!(markers[0]["startColumn"], 4);
    Ok(())
}

#[test]
fn check_without_server_fails() -> Result<()> {
    let home = tempfile::tempdir()?;
    let file = home.path().join("notes.txt");
    std::fs::write(&file, "TODO\n")?;

    let output = bridle(home.path())
        .arg("check")
        .arg(&file)
        .arg("--timeout")
        .arg("1")
        .output()?;

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("did not start"));
    Ok(())
}
