// crates/mig-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for mig-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::path::PathBuf;

use mig_config::ConfigError;
use mig_config::MigConfig;
use tempfile::TempDir;

/// Result type used by config tests.
pub type TestResult = Result<(), String>;

/// Parses and validates a TOML string.
pub fn config_from_toml(toml_str: &str) -> Result<MigConfig, ConfigError> {
    MigConfig::from_toml(toml_str)
}

/// Writes `content` to `mig.toml` in a fresh temporary directory.
pub fn write_config(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mig.toml");
    fs::write(&path, content).expect("write config");
    (dir, path)
}

/// Asserts that a result is an error whose message contains `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
