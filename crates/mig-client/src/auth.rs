// crates/mig-client/src/auth.rs
// ============================================================================
// Module: Request Authentication
// Description: Signed token headers attached to API requests.
// Purpose: Prove the investigator's identity on every request.
// Dependencies: mig-auth, mig-core, rand
// ============================================================================

//! ## Overview
//! An [`Authenticator`] produces the header attached to each API request.
//! [`SignedTokenAuthenticator`] signs `timestamp;nonce\n` with the
//! investigator's key and sends it under the scheme's
//! `X-<SCHEME>AUTHORIZATION` header. A fresh token is minted per request so
//! it always falls inside the authority's acceptance window.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use mig_auth::SignatureScheme;
use mig_auth::make_signed_token;
use mig_core::Clock;
use mig_core::Fingerprint;
use rand::Rng;

use crate::ClientError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Header name and value proving the caller's identity.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Source of request authentication headers.
pub trait Authenticator: Send + Sync {
    /// Produces the header for the next request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the token cannot be signed.
    fn authenticate(&self) -> Result<AuthHeader, ClientError>;
}

// ============================================================================
// SECTION: Signed Tokens
// ============================================================================

/// Authenticator signing a fresh token per request.
pub struct SignedTokenAuthenticator {
    /// Provider holding the investigator's private key.
    scheme: Arc<dyn SignatureScheme>,
    /// Investigator key fingerprint.
    fingerprint: Fingerprint,
    /// Time source for token timestamps.
    clock: Arc<dyn Clock>,
}

impl SignedTokenAuthenticator {
    /// Creates an authenticator for the given key.
    #[must_use]
    pub fn new(
        scheme: Arc<dyn SignatureScheme>,
        fingerprint: Fingerprint,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheme,
            fingerprint,
            clock,
        }
    }

    /// Returns the signing key fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl Authenticator for SignedTokenAuthenticator {
    fn authenticate(&self) -> Result<AuthHeader, ClientError> {
        let nonce = rand::thread_rng().gen_range(1 ..= i64::MAX.unsigned_abs());
        let value =
            make_signed_token(self.scheme.as_ref(), &self.fingerprint, self.clock.now(), nonce)?;
        Ok(AuthHeader {
            name: self.scheme.identify().header_name().to_string(),
            value,
        })
    }
}

/// Authenticator returning a fixed header.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    /// Header returned for every request.
    header: AuthHeader,
}

impl StaticAuthenticator {
    /// Creates an authenticator returning `name: value`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header: AuthHeader {
                name: name.into(),
                value: value.into(),
            },
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self) -> Result<AuthHeader, ClientError> {
        Ok(self.header.clone())
    }
}
