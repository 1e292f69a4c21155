// crates/mig-auth/src/token.rs
// ============================================================================
// Module: Signed Auth Tokens
// Description: Timestamped, nonce-bearing request authentication tokens.
// Purpose: Authenticate API requests with an investigator's signing key.
// Dependencies: base64, mig-core, thiserror, time
// ============================================================================

//! ## Overview
//! A token is `timestamp;nonce;signature` where `timestamp` is an RFC3339 UTC
//! instant at second precision, `nonce` is numeric, and `signature` is the
//! base64 signature over `timestamp;nonce\n`. The versioned legacy form
//! `1;timestamp;nonce;signature` (signed over `1;timestamp;nonce\n`) is
//! accepted on verification only.
//!
//! Security posture: tokens are untrusted input; header size is bounded and
//! timestamps outside the acceptance window are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mig_core::Fingerprint;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;

use crate::scheme::SchemeError;
use crate::scheme::SignatureScheme;
use crate::scheme::try_multiple_key_verification;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted header value length in bytes.
pub const MAX_TOKEN_HEADER_BYTES: usize = 8 * 1024;

/// Default acceptance window around the verifier's clock.
pub const DEFAULT_TOKEN_WINDOW: Duration = Duration::seconds(600);

/// Version prefix of the legacy token form.
const LEGACY_TOKEN_VERSION: &str = "1";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token creation and verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Header value exceeds [`MAX_TOKEN_HEADER_BYTES`].
    #[error("auth token exceeds {max} bytes")]
    TooLarge {
        /// Limit in bytes.
        max: usize,
    },
    /// Token text is malformed.
    #[error("malformed auth token: {0}")]
    Malformed(String),
    /// Token timestamp is outside the acceptance window.
    #[error("auth token timestamp {timestamp} is outside the {window_secs}s window")]
    OutsideWindow {
        /// Token timestamp text.
        timestamp: String,
        /// Window size in seconds.
        window_secs: i64,
    },
    /// Signature creation or verification failed.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Successfully verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Fingerprint whose key verified the signature.
    pub fingerprint: Fingerprint,
    /// Token timestamp.
    pub timestamp: OffsetDateTime,
    /// Token nonce.
    pub nonce: u64,
}

/// Parsed token fields.
struct ParsedToken<'a> {
    /// Exact bytes that were signed.
    signed: String,
    /// Timestamp text.
    timestamp: &'a str,
    /// Nonce value.
    nonce: u64,
    /// Base64 signature text.
    signature: &'a str,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Formats `now` as the token timestamp: RFC3339 UTC at second precision.
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] when the instant cannot be formatted.
pub fn token_timestamp(now: OffsetDateTime) -> Result<String, TokenError> {
    let utc = now.to_offset(UtcOffset::UTC);
    let truncated =
        utc.replace_nanosecond(0).map_err(|err| TokenError::Malformed(err.to_string()))?;
    truncated.format(&Rfc3339).map_err(|err| TokenError::Malformed(err.to_string()))
}

/// Creates a signed token with the key behind `fingerprint`.
///
/// # Errors
///
/// Returns [`TokenError::Scheme`] when signing fails.
pub fn make_signed_token(
    scheme: &dyn SignatureScheme,
    fingerprint: &Fingerprint,
    now: OffsetDateTime,
    nonce: u64,
) -> Result<String, TokenError> {
    let timestamp = token_timestamp(now)?;
    let signed = format!("{timestamp};{nonce}\n");
    let signature = scheme.sign(fingerprint, signed.as_bytes())?;
    Ok(format!("{timestamp};{nonce};{}", STANDARD.encode(signature)))
}

/// Verifies a token against candidate keys of one scheme.
///
/// # Errors
///
/// Returns [`TokenError`] when the token is oversized, malformed, outside the
/// window, or no candidate key verifies it (the last verification error).
pub fn verify_signed_token(
    scheme: &dyn SignatureScheme,
    candidates: &[Fingerprint],
    token: &str,
    now: OffsetDateTime,
    window: Duration,
) -> Result<VerifiedToken, TokenError> {
    if token.len() > MAX_TOKEN_HEADER_BYTES {
        return Err(TokenError::TooLarge {
            max: MAX_TOKEN_HEADER_BYTES,
        });
    }
    let parsed = parse_token(token.trim())?;
    let timestamp = OffsetDateTime::parse(parsed.timestamp, &Rfc3339)
        .map_err(|err| TokenError::Malformed(format!("timestamp: {err}")))?;
    if (timestamp - now).abs() > window {
        return Err(TokenError::OutsideWindow {
            timestamp: parsed.timestamp.to_string(),
            window_secs: window.whole_seconds(),
        });
    }
    let signature = STANDARD
        .decode(parsed.signature)
        .map_err(|err| TokenError::Malformed(format!("signature: {err}")))?;
    let fingerprint =
        try_multiple_key_verification(scheme, candidates, &signature, parsed.signed.as_bytes())?;
    Ok(VerifiedToken {
        fingerprint,
        timestamp,
        nonce: parsed.nonce,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Splits a token into its fields and rebuilds the signed text.
fn parse_token(token: &str) -> Result<ParsedToken<'_>, TokenError> {
    let parts: Vec<&str> = token.split(';').collect();
    let (signed_prefix, timestamp, nonce, signature) = match parts.as_slice() {
        [timestamp, nonce, signature] => (None, *timestamp, *nonce, *signature),
        [version, timestamp, nonce, signature] if *version == LEGACY_TOKEN_VERSION => {
            (Some(*version), *timestamp, *nonce, *signature)
        }
        [version, _, _, _] => {
            return Err(TokenError::Malformed(format!("unsupported token version {version}")));
        }
        _ => return Err(TokenError::Malformed(format!("expected 3 fields, got {}", parts.len()))),
    };
    let nonce_value: u64 = nonce
        .parse()
        .map_err(|_| TokenError::Malformed("nonce is not numeric".to_string()))?;
    if signature.is_empty() {
        return Err(TokenError::Malformed("signature is empty".to_string()));
    }
    let signed = match signed_prefix {
        Some(version) => format!("{version};{timestamp};{nonce}\n"),
        None => format!("{timestamp};{nonce}\n"),
    };
    Ok(ParsedToken {
        signed,
        timestamp,
        nonce: nonce_value,
        signature,
    })
}
