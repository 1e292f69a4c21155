// crates/mig-config/tests/config_validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Defaults, loading, and fail-closed validation for mig.toml.
// Purpose: Ensure every section defaults sensibly and rejects bad values.
// =============================================================================
//! ## Overview
//! Defaults, loading, and fail-closed validation for mig.toml.


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

use std::time::Duration;

use mig_auth::SchemeId;
use mig_config::ConfigError;
use mig_config::MigConfig;

mod common;

use common::TestResult;
use common::assert_invalid;
use common::config_from_toml;
use common::write_config;

const FULL_CONFIG: &str = r#"
[api]
url = "https://mig.example.net/api/v1/"
timeout_ms = 5000

[signing]
scheme = "auth-scheme-ed25519"
fingerprint = "e60892bb9bd89a69f759a1f0a3d2ac4d1e8c2f1a"
key_file = "keys/investigator.json"
passphrase_env = "MIG_PASSPHRASE"

[follow]
poll_interval_ms = 500

[search]
page_size = 50

[authority]
token_window_secs = 300

[[authority.permissions]]
name = "default"
required_signatures = 2
required_authoritative_signers = 1
authoritative_signers = ["AAAA"]
non_authoritative_signers = ["BBBB"]
"#;

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn empty_config_uses_documented_defaults() {
    let config = config_from_toml("").unwrap();
    assert_eq!(config.api.url, None);
    assert_eq!(config.api.timeout(), Duration::from_secs(10));
    assert_eq!(config.api.max_response_bytes, 8 * 1024 * 1024);
    assert_eq!(config.follow.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.follow.expiry_grace(), Duration::from_secs(10));
    assert_eq!(config.follow.max_fetch_retries, 30);
    assert_eq!(config.follow.retry_interval(), Duration::from_secs(1));
    assert_eq!(config.search.page_size, 37);
    assert_eq!(config.authority.token_window(), time::Duration::seconds(600));
    assert!(config.authority.acl().unwrap().is_empty());
}

#[test]
fn full_config_parses() {
    let config = config_from_toml(FULL_CONFIG).unwrap();
    assert_eq!(config.api.base_url().unwrap().host_str(), Some("mig.example.net"));
    assert_eq!(config.signing.scheme, Some(SchemeId::Ed25519));
    assert_eq!(
        config.signing.fingerprint.as_ref().map(|fp| fp.as_str().to_string()),
        Some("E60892BB9BD89A69F759A1F0A3D2AC4D1E8C2F1A".to_string())
    );
    assert_eq!(config.follow.poll_interval_ms, 500);
    assert_eq!(config.follow.max_fetch_retries, 30);
    assert_eq!(config.search.page_size, 50);
    let acl = config.authority.acl().unwrap();
    assert_eq!(acl.permission_for("ping").unwrap().name, "default");
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn load_reads_explicit_path() {
    let (_dir, path) = write_config(FULL_CONFIG);
    let config = MigConfig::load(Some(&path)).unwrap();
    assert_eq!(config.source_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.search.page_size, 50);
}

#[test]
fn load_reports_missing_file_as_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = MigConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let (_dir, path) = write_config(&format!("# {}\n", "x".repeat(1024 * 1024)));
    assert_invalid(MigConfig::load(Some(&path)), "size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mig.toml");
    std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
    assert_invalid(MigConfig::load(Some(&path)), "utf-8")
}

#[test]
fn load_rejects_overlong_path_component() -> TestResult {
    let path = std::path::PathBuf::from(format!("/tmp/{}.toml", "a".repeat(300)));
    assert_invalid(MigConfig::load(Some(&path)), "component too long")
}

#[test]
fn malformed_toml_is_a_parse_error() {
    assert!(matches!(config_from_toml("[api"), Err(ConfigError::Parse(_))));
    assert!(matches!(config_from_toml("[unknown]\nx = 1"), Err(ConfigError::Parse(_))));
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn api_url_must_be_http() -> TestResult {
    assert_invalid(config_from_toml("[api]\nurl = \"ftp://mig.example.net\""), "not http(s)")?;
    assert_invalid(config_from_toml("[api]\nurl = \"not a url\""), "api.url is invalid")
}

#[test]
fn api_url_is_required_only_on_use() -> TestResult {
    let config = config_from_toml("").unwrap();
    assert_invalid(config.api.base_url(), "api.url is required")
}

#[test]
fn api_timeout_bounds_are_enforced() -> TestResult {
    assert_invalid(config_from_toml("[api]\ntimeout_ms = 99"), "api.timeout_ms")?;
    assert_invalid(config_from_toml("[api]\ntimeout_ms = 120001"), "api.timeout_ms")?;
    config_from_toml("[api]\ntimeout_ms = 120000").map(|_| ()).map_err(|err| err.to_string())
}

#[test]
fn unsupported_signing_scheme_is_rejected() {
    assert!(matches!(
        config_from_toml("[signing]\nscheme = \"auth-scheme-pgp\""),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn passphrase_env_must_be_a_variable_name() -> TestResult {
    assert_invalid(config_from_toml("[signing]\npassphrase_env = \"MY VAR\""), "passphrase_env")
}

#[test]
fn follow_bounds_are_enforced() -> TestResult {
    assert_invalid(config_from_toml("[follow]\nmax_fetch_retries = 0"), "max_fetch_retries")?;
    assert_invalid(config_from_toml("[follow]\npoll_interval_ms = 0"), "poll_interval_ms")?;
    assert_invalid(config_from_toml("[follow]\nexpiry_grace_ms = 600001"), "expiry_grace_ms")
}

#[test]
fn search_page_size_bounds_are_enforced() -> TestResult {
    assert_invalid(config_from_toml("[search]\npage_size = 0"), "page_size")?;
    assert_invalid(config_from_toml("[search]\npage_size = 1001"), "page_size")
}

#[test]
fn zero_threshold_permission_fails_closed() -> TestResult {
    let text = r#"
[[authority.permissions]]
name = "default"
required_signatures = 0
"#;
    assert_invalid(config_from_toml(text), "required_signatures")
}

#[test]
fn overlapping_signer_lists_fail_closed() -> TestResult {
    let text = r#"
[[authority.permissions]]
name = "default"
required_signatures = 1
authoritative_signers = ["AAAA"]
non_authoritative_signers = ["aaaa"]
"#;
    assert_invalid(config_from_toml(text), "authoritative and non-authoritative")
}

#[test]
fn duplicate_permissions_fail_closed() -> TestResult {
    let text = r#"
[[authority.permissions]]
name = "file"
required_signatures = 1

[[authority.permissions]]
name = "file"
required_signatures = 2
"#;
    assert_invalid(config_from_toml(text), "duplicate permission")
}

#[test]
fn token_window_bounds_are_enforced() -> TestResult {
    assert_invalid(config_from_toml("[authority]\ntoken_window_secs = 0"), "token_window_secs")
}
