// crates/mig-client/src/lib.rs
// ============================================================================
// Module: MIG Client Library
// Description: Action catalog, API transport, and dispatch orchestration.
// Purpose: Everything an investigator client needs to run an action.
// Dependencies: mig-auth, mig-config, mig-core, mig-targeting, reqwest, tokio
// ============================================================================

//! ## Overview
//! `mig-client` assembles actions in a local [`ActionCatalog`], signs them,
//! submits them through a [`MigApi`] implementation ([`HttpMigApi`] over
//! HTTP), follows their progress, and collects per-agent command results.
//! The [`Orchestrator`] drives that sequence; library code never installs a
//! tracing subscriber.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod auth;
pub mod catalog;
pub mod collection;
pub mod error;
pub mod http;
pub mod orchestrator;

#[cfg(test)]
mod tests;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use api::CommandSearch;
pub use api::MigApi;
pub use auth::AuthHeader;
pub use auth::Authenticator;
pub use auth::SignedTokenAuthenticator;
pub use auth::StaticAuthenticator;
pub use catalog::ActionCatalog;
pub use catalog::ActionRecord;
pub use catalog::DEFAULT_ENTROPY_BACKOFF;
pub use catalog::EntropySource;
pub use catalog::LOCAL_ID_BYTES;
pub use catalog::OsEntropy;
pub use catalog::RecordStatus;
pub use collection::ApiError;
pub use collection::NO_RESULTS_MESSAGE;
pub use collection::Resource;
pub use error::CatalogError;
pub use error::ClientError;
pub use http::HttpMigApi;
pub use orchestrator::FollowCancel;
pub use orchestrator::FollowEnd;
pub use orchestrator::FollowEvent;
pub use orchestrator::FollowOutcome;
pub use orchestrator::Orchestrator;
pub use orchestrator::PROGRESS_REPORT_CEILING;
