//! Environment override tests for sticky-assign-config.
// crates/sticky-assign-config/tests/env_overrides.rs
// =============================================================================
// Module: Config Environment Override Tests
// Description: Validate PORT and database URL overrides and config discovery.
// Purpose: Ensure deployment variables win over file values and fail closed.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use sticky_assign_config::StickyAssignConfig;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: HashMap<String, String> =
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    move |key| map.get(key).cloned()
}

#[test]
fn port_rebinds_all_interfaces() -> TestResult {
    let config = StickyAssignConfig::load_with_env(None, env_from(&[("PORT", "3000")]))
        .map_err(|err| err.to_string())?;
    if config.server.bind != "0.0.0.0:3000" {
        return Err(format!("unexpected bind {}", config.server.bind));
    }
    Ok(())
}

#[test]
fn invalid_port_fails_closed() -> TestResult {
    match StickyAssignConfig::load_with_env(None, env_from(&[("PORT", "eighty")])) {
        Err(err) if err.to_string().contains("PORT must be a port number") => Ok(()),
        other => Err(format!("expected port error, got {:?}", other.map(|_| ()))),
    }
}

#[test]
fn assignments_database_url_wins_over_database_url() -> TestResult {
    let config = StickyAssignConfig::load_with_env(
        None,
        env_from(&[
            ("ASSIGNMENTS_DATABASE_URL", "file:./assign.db?mode=rwc"),
            ("DATABASE_URL", "file:./admin.db"),
        ]),
    )
    .map_err(|err| err.to_string())?;
    if config.store.path != PathBuf::from("./assign.db") {
        return Err(format!("unexpected path {}", config.store.path.display()));
    }
    Ok(())
}

#[test]
fn database_url_is_fallback() -> TestResult {
    let config = StickyAssignConfig::load_with_env(
        None,
        env_from(&[("ASSIGNMENTS_DATABASE_URL", "  "), ("DATABASE_URL", "file:./admin.db")]),
    )
    .map_err(|err| err.to_string())?;
    if config.store.path != PathBuf::from("./admin.db") {
        return Err(format!("unexpected path {}", config.store.path.display()));
    }
    Ok(())
}

#[test]
fn env_overrides_file_values() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[server]\nbind = \"127.0.0.1:9000\"\n[store]\npath = \"from-file.db\"\n")
        .map_err(|err| err.to_string())?;
    let path = file.path().to_string_lossy().to_string();
    let config = StickyAssignConfig::load_with_env(
        None,
        env_from(&[
            ("STICKY_ASSIGN_CONFIG", path.as_str()),
            ("PORT", "8181"),
            ("DATABASE_URL", "file:/data/env.db"),
        ]),
    )
    .map_err(|err| err.to_string())?;
    if config.server.bind != "0.0.0.0:8181" || config.store.path != PathBuf::from("/data/env.db") {
        return Err(format!("overrides not applied: {config:?}"));
    }
    if config.source.is_none() {
        return Err("config file from env var was not read".to_string());
    }
    Ok(())
}
