// crates/mig-config/src/lib.rs
// ============================================================================
// Module: MIG Config Library
// Description: Configuration model for investigator clients and authorities.
// Purpose: Load, default, and validate `mig.toml`.
// Dependencies: mig-auth, serde, toml, url
// ============================================================================

//! ## Overview
//! `mig-config` owns the configuration file shared by the `mig` client and
//! an authority: API endpoint, signing key, follow and search tuning, and the
//! action ACL.
//! Security posture: config inputs are untrusted and validation fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ApiConfig;
pub use config::AuthorityConfig;
pub use config::ConfigError;
pub use config::FollowConfig;
pub use config::MigConfig;
pub use config::SearchConfig;
pub use config::SigningConfig;
