// crates/mig-config/src/config.rs
// ============================================================================
// Module: MIG Configuration
// Description: Configuration loading and validation for MIG tools.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: mig-auth, mig-core, serde, time, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults; `[api] url` is only required by commands that
//! talk to an API. The ACL under `[authority]` is validated through
//! [`Acl::new`], so a misconfigured permission is rejected at load time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use mig_auth::Acl;
use mig_auth::Permission;
use mig_auth::SchemeId;
use mig_core::Fingerprint;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "mig.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "MIG_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Minimum API timeout in milliseconds.
const MIN_API_TIMEOUT_MS: u64 = 100;
/// Maximum API timeout in milliseconds.
const MAX_API_TIMEOUT_MS: u64 = 120_000;
/// Maximum accepted API response size in bytes.
const MAX_RESPONSE_BYTES_LIMIT: usize = 64 * 1024 * 1024;
/// Minimum poll or retry interval in milliseconds.
const MIN_INTERVAL_MS: u64 = 10;
/// Maximum poll or retry interval in milliseconds.
const MAX_INTERVAL_MS: u64 = 60_000;
/// Maximum grace period after expiry in milliseconds.
const MAX_EXPIRY_GRACE_MS: u64 = 600_000;
/// Maximum consecutive fetch retries.
const MAX_FETCH_RETRIES: u32 = 1_000;
/// Maximum search page size.
const MAX_PAGE_SIZE: u32 = 1_000;
/// Maximum token window in seconds.
const MAX_TOKEN_WINDOW_SECS: u64 = 86_400;
/// Maximum number of ACL permissions.
const MAX_PERMISSIONS: usize = 256;
/// Maximum environment variable name length.
const MAX_ENV_NAME_LENGTH: usize = 128;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// MIG configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MigConfig {
    /// API endpoint configuration.
    #[serde(default)]
    pub api: ApiConfig,
    /// Signing key configuration.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Follow loop tuning.
    #[serde(default)]
    pub follow: FollowConfig,
    /// Result search tuning.
    #[serde(default)]
    pub search: SearchConfig,
    /// Authority-side token and ACL configuration.
    #[serde(default)]
    pub authority: AuthorityConfig,
    /// Path the configuration was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl MigConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// explicit path, then `MIG_CONFIG`, then `mig.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        config.source_path = Some(resolved);
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.signing.validate()?;
        self.follow.validate()?;
        self.search.validate()?;
        self.authority.validate()?;
        Ok(())
    }
}

/// API endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the MIG API.
    #[serde(default)]
    pub url: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl ApiConfig {
    /// Validates API settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            parse_api_url(url)?;
        }
        if !(MIN_API_TIMEOUT_MS ..= MAX_API_TIMEOUT_MS).contains(&self.timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "api.timeout_ms must be between {MIN_API_TIMEOUT_MS} and {MAX_API_TIMEOUT_MS}"
            )));
        }
        if self.max_response_bytes == 0 || self.max_response_bytes > MAX_RESPONSE_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "api.max_response_bytes must be between 1 and {MAX_RESPONSE_BYTES_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Returns the parsed API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no URL is configured or it is
    /// not an http(s) URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("api.url is required".to_string()))?;
        parse_api_url(url)
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Signing key configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// Scheme of the signing key.
    #[serde(default)]
    pub scheme: Option<SchemeId>,
    /// Fingerprint of the signing key.
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    /// Path to the key file.
    #[serde(default)]
    pub key_file: Option<String>,
    /// Environment variable holding the key passphrase.
    #[serde(default)]
    pub passphrase_env: Option<String>,
}

impl SigningConfig {
    /// Validates signing settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.key_file {
            validate_path_string("signing.key_file", path)?;
        }
        if let Some(name) = &self.passphrase_env {
            let valid = !name.is_empty()
                && name.len() <= MAX_ENV_NAME_LENGTH
                && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
            if !valid {
                return Err(ConfigError::Invalid(
                    "signing.passphrase_env must be a valid environment variable name".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the configured key file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no key file is configured.
    pub fn key_file_path(&self) -> Result<PathBuf, ConfigError> {
        self.key_file
            .as_deref()
            .map(|path| PathBuf::from(path.trim()))
            .ok_or_else(|| ConfigError::Invalid("signing.key_file is required".to_string()))
    }
}

/// Follow loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FollowConfig {
    /// Wait between polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Grace period after `expireafter` in milliseconds.
    #[serde(default = "default_expiry_grace_ms")]
    pub expiry_grace_ms: u64,
    /// Consecutive fetch failures tolerated.
    #[serde(default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,
    /// Wait between fetch retries in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            expiry_grace_ms: default_expiry_grace_ms(),
            max_fetch_retries: default_max_fetch_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl FollowConfig {
    /// Validates follow settings.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("follow.poll_interval_ms", self.poll_interval_ms),
            ("follow.retry_interval_ms", self.retry_interval_ms),
        ] {
            if !(MIN_INTERVAL_MS ..= MAX_INTERVAL_MS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between {MIN_INTERVAL_MS} and {MAX_INTERVAL_MS}"
                )));
            }
        }
        if self.expiry_grace_ms > MAX_EXPIRY_GRACE_MS {
            return Err(ConfigError::Invalid(format!(
                "follow.expiry_grace_ms must be at most {MAX_EXPIRY_GRACE_MS}"
            )));
        }
        if self.max_fetch_retries == 0 || self.max_fetch_retries > MAX_FETCH_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "follow.max_fetch_retries must be between 1 and {MAX_FETCH_RETRIES}"
            )));
        }
        Ok(())
    }

    /// Wait between polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Grace period after expiry.
    #[must_use]
    pub const fn expiry_grace(&self) -> Duration {
        Duration::from_millis(self.expiry_grace_ms)
    }

    /// Wait between fetch retries.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Result search tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Results requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl SearchConfig {
    /// Validates search settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "search.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Authority-side configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityConfig {
    /// Token acceptance window in seconds.
    #[serde(default = "default_token_window_secs")]
    pub token_window_secs: u64,
    /// ACL permissions.
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            token_window_secs: default_token_window_secs(),
            permissions: Vec::new(),
        }
    }
}

impl AuthorityConfig {
    /// Validates authority settings, including the ACL.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_window_secs == 0 || self.token_window_secs > MAX_TOKEN_WINDOW_SECS {
            return Err(ConfigError::Invalid(format!(
                "authority.token_window_secs must be between 1 and {MAX_TOKEN_WINDOW_SECS}"
            )));
        }
        if self.permissions.len() > MAX_PERMISSIONS {
            return Err(ConfigError::Invalid(format!(
                "authority.permissions exceeds {MAX_PERMISSIONS} entries"
            )));
        }
        self.acl()?;
        Ok(())
    }

    /// Builds the ACL from the configured permissions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for invalid or duplicate permissions.
    pub fn acl(&self) -> Result<Acl, ConfigError> {
        Acl::new(self.permissions.iter().cloned())
            .map_err(|err| ConfigError::Invalid(format!("authority.permissions: {err}")))
    }

    /// Returns the token window as a signed duration.
    #[must_use]
    pub fn token_window(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.token_window_secs).unwrap_or(i64::MAX))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Parses an API URL, accepting only http and https.
fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|err| ConfigError::Invalid(format!("api.url is invalid: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid(format!("api.url scheme {other} is not http(s)"))),
    }
}

/// Default API timeout in milliseconds.
const fn default_timeout_ms() -> u64 {
    10_000
}

/// Default maximum response size in bytes.
const fn default_max_response_bytes() -> usize {
    8 * 1024 * 1024
}

/// Default poll interval in milliseconds.
const fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Default expiry grace in milliseconds.
const fn default_expiry_grace_ms() -> u64 {
    10_000
}

/// Default consecutive fetch retries.
const fn default_max_fetch_retries() -> u32 {
    30
}

/// Default retry interval in milliseconds.
const fn default_retry_interval_ms() -> u64 {
    1_000
}

/// Default search page size.
const fn default_page_size() -> u32 {
    37
}

/// Default token window in seconds.
const fn default_token_window_secs() -> u64 {
    600
}
