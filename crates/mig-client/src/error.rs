// crates/mig-client/src/error.rs
// ============================================================================
// Module: Client Errors
// Description: Error types for the catalog, transport, and orchestrator.
// Purpose: Give every client-side failure an explicit, typed kind.
// Dependencies: mig-auth, mig-core, mig-targeting, thiserror
// ============================================================================

//! ## Overview
//! [`CatalogError`] covers local catalog failures, which are never retried.
//! [`ClientError`] covers everything that crosses the API boundary plus the
//! summarizing failures the orchestrator returns after exhausting retries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use mig_auth::SchemeError;
use mig_auth::TokenError;
use mig_core::LocalActionId;
use mig_core::ModuleError;
use mig_core::OperationError;
use mig_targeting::QueryError;
use thiserror::Error;

// ============================================================================
// SECTION: Catalog Errors
// ============================================================================

/// Local action catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// No catalog entry has the identifier.
    #[error("action {0} not found in catalog")]
    NotFound(LocalActionId),
    /// Target queries failed to compile.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Module parameters failed to build.
    #[error(transparent)]
    Module(#[from] ModuleError),
    /// No target query was supplied.
    #[error("action target requires at least one query")]
    MissingTarget,
    /// The expiry offset is not positive or overflows.
    #[error("action expiry must be a positive offset from now")]
    InvalidExpiry,
    /// Operation compression failed.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// Every identifier draw failed or collided.
    #[error("no unique action id after {attempts} attempts")]
    IdExhausted {
        /// Draws attempted.
        attempts: usize,
    },
    /// The entry is no longer pending dispatch.
    #[error("action {id} is {status}, not pending dispatch")]
    NotPending {
        /// Catalog identifier.
        id: LocalActionId,
        /// Current record status.
        status: String,
    },
    /// Operations cannot change once the action carries signatures.
    #[error("action {0} is already signed")]
    AlreadySigned(LocalActionId),
    /// The entry changed between building the signing payload and storing
    /// the signature.
    #[error("action {0} changed while it was being signed")]
    SignedContentChanged(LocalActionId),
    /// The catalog lock was poisoned by a panicking writer.
    #[error("action catalog lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Client Errors
// ============================================================================

/// Dispatch, retrieval, and orchestration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The authority refused the submitted action.
    #[error("action dispatch rejected with status {status}: {code} {message}")]
    DispatchRejected {
        /// HTTP status returned.
        status: u16,
        /// Remote error code, if provided.
        code: String,
        /// Remote error message, if provided.
        message: String,
    },
    /// Following an action gave up after repeated fetch failures.
    #[error("failed to follow action after {attempts} attempts: {last_error}")]
    FollowFailed {
        /// Consecutive failed fetches.
        attempts: u32,
        /// Last fetch error observed.
        last_error: String,
    },
    /// A retrieval request returned a non-success status.
    #[error("api returned status {status}: {code} {message}")]
    Http {
        /// HTTP status returned.
        status: u16,
        /// Remote error code, if provided.
        code: String,
        /// Remote error message, if provided.
        message: String,
    },
    /// The search endpoint reported no results.
    #[error("no results found")]
    NoResults,
    /// The request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The response body exceeded the configured limit.
    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Limit in bytes.
        limit: usize,
    },
    /// Local catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Signing failure.
    #[error(transparent)]
    Signing(#[from] SchemeError),
    /// Auth token creation failure.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Operation encoding failure.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// Unexpected failure at an orchestration boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Returns true for failures a later fetch may not repeat.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Http { .. }
                | Self::Protocol(_)
                | Self::ResponseTooLarge { .. }
                | Self::NoResults
        )
    }

    /// Returns true for the search endpoint's end-of-results signal.
    #[must_use]
    pub const fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults)
    }
}
