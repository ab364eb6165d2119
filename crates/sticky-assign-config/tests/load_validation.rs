//! Config load validation tests for sticky-assign-config.
// crates/sticky-assign-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, limits).
// Purpose: Ensure config input handling is strict and fail-closed.
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

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use sticky_assign_config::ConfigError;
use sticky_assign_config::StickyAssignConfig;
use sticky_assign_store_sqlite::SqliteStoreMode;
use sticky_assign_store_sqlite::SqliteSyncMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn no_env(_key: &str) -> Option<String> {
    None
}

fn write_config(contents: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(contents.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(
        StickyAssignConfig::load_with_env(Some(Path::new(&long_path)), no_env),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        StickyAssignConfig::load_with_env(Some(Path::new(&long_component)), no_env),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_explicit_file() -> TestResult {
    let result =
        StickyAssignConfig::load_with_env(Some(Path::new("/nonexistent/sticky.toml")), no_env);
    match result {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {:?}", other.map(|_| ()))),
    }
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(
        StickyAssignConfig::load_with_env(Some(file.path()), no_env),
        "config file exceeds size limit",
    )
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(
        StickyAssignConfig::load_with_env(Some(file.path()), no_env),
        "config file must be utf-8",
    )
}

#[test]
fn load_rejects_unknown_fields() -> TestResult {
    let file = write_config("[server]\nbind = \"127.0.0.1:9000\"\nworkers = 4\n")?;
    match StickyAssignConfig::load_with_env(Some(file.path()), no_env) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {:?}", other.map(|_| ()))),
    }
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let file = write_config("")?;
    let config = StickyAssignConfig::load_with_env(Some(file.path()), no_env)
        .map_err(|err| err.to_string())?;
    if config.server.bind != "127.0.0.1:8080"
        || config.server.max_body_bytes != 16_384
        || config.server.request_timeout_ms != 5_000
        || config.server.max_identifier_bytes != 128
    {
        return Err(format!("unexpected server defaults: {:?}", config.server));
    }
    if config.store.path != PathBuf::from("assignments.sqlite")
        || config.store.journal_mode != SqliteStoreMode::Wal
        || config.store.sync_mode != SqliteSyncMode::Full
        || config.store.writer_queue_capacity != 1_024
        || config.store.read_pool_size != 4
    {
        return Err(format!("unexpected store defaults: {:?}", config.store));
    }
    if config.source.as_deref() != Some(file.path()) {
        return Err("source path not recorded".to_string());
    }
    Ok(())
}

#[test]
fn full_file_is_parsed() -> TestResult {
    let file = write_config(
        r#"
[server]
bind = "127.0.0.1:9090"
max_body_bytes = 4096
request_timeout_ms = 250
max_identifier_bytes = 64

[store]
path = "/tmp/sticky/assignments.sqlite"
busy_timeout_ms = 100
journal_mode = "delete"
sync_mode = "normal"
writer_queue_capacity = 8
read_pool_size = 2
"#,
    )?;
    let config = StickyAssignConfig::load_with_env(Some(file.path()), no_env)
        .map_err(|err| err.to_string())?;
    let sqlite = config.store.to_sqlite_config();
    if config.server.bind_addr().map_err(|err| err.to_string())?.port() != 9090
        || config.server.request_timeout().as_millis() != 250
        || sqlite.journal_mode != SqliteStoreMode::Delete
        || sqlite.sync_mode != SqliteSyncMode::Normal
        || sqlite.writer_queue_capacity != 8
        || sqlite.read_pool_size != 2
    {
        return Err(format!("unexpected config: {config:?}"));
    }
    Ok(())
}

#[test]
fn validate_rejects_bad_bind() -> TestResult {
    let mut config = StickyAssignConfig::default();
    config.server.bind = "localhost".to_string();
    assert_invalid(config.validate(), "invalid bind address")
}

#[test]
fn validate_rejects_zero_limits() -> TestResult {
    let mut config = StickyAssignConfig::default();
    config.server.max_body_bytes = 0;
    assert_invalid(config.validate(), "server.max_body_bytes")?;

    let mut config = StickyAssignConfig::default();
    config.server.request_timeout_ms = 0;
    assert_invalid(config.validate(), "server.request_timeout_ms")?;

    let mut config = StickyAssignConfig::default();
    config.server.max_identifier_bytes = 0;
    assert_invalid(config.validate(), "server.max_identifier_bytes")?;

    let mut config = StickyAssignConfig::default();
    config.store.writer_queue_capacity = 0;
    assert_invalid(config.validate(), "store.writer_queue_capacity")?;

    let mut config = StickyAssignConfig::default();
    config.store.read_pool_size = 0;
    assert_invalid(config.validate(), "store.read_pool_size")
}

#[test]
fn validate_rejects_empty_store_path() -> TestResult {
    let mut config = StickyAssignConfig::default();
    config.store.path = PathBuf::from("  ");
    assert_invalid(config.validate(), "store.path must be non-empty")
}
