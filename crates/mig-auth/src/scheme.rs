// crates/mig-auth/src/scheme.rs
// ============================================================================
// Module: Signature Schemes
// Description: Scheme identifiers, the signing contract, and scheme registry.
// Purpose: Let callers sign and verify without knowing the algorithm in use.
// Dependencies: mig-core, serde, sha2, thiserror
// ============================================================================

//! ## Overview
//! A [`SignatureScheme`] signs and verifies detached signatures for keys it
//! holds, addressed by [`Fingerprint`]. The set of schemes is closed: every
//! provider reports one [`SchemeId`], and unknown identifiers are rejected at
//! parse time. [`SchemeRegistry`] selects providers at runtime.
//!
//! Security posture: signatures and key material are untrusted input; every
//! parse failure is surfaced as a typed error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mig_core::Fingerprint;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::keystore::KeyFile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of SHA-256 bytes kept in a fingerprint.
pub const FINGERPRINT_BYTES: usize = 20;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cryptographic and key management errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemeError {
    /// No key with the fingerprint is held.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// The private key is sealed and could not be unlocked.
    #[error("key locked: {0}")]
    KeyLocked(String),
    /// The signature does not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// The signing primitive failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),
    /// Key material is malformed or too weak.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// The scheme identifier is not supported.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// Key file or key ring storage failed.
    #[error("key store error: {0}")]
    KeyStore(String),
}

// ============================================================================
// SECTION: Scheme Identifiers
// ============================================================================

/// Closed set of supported signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SchemeId {
    /// Ed25519 with strict verification.
    Ed25519,
    /// RSASSA-PKCS1-v1_5 over SHA-256.
    Rsa,
}

impl SchemeId {
    /// Every supported scheme, in registry order.
    pub const ALL: [Self; 2] = [Self::Ed25519, Self::Rsa];

    /// Returns the stable identifier string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "auth-scheme-ed25519",
            Self::Rsa => "auth-scheme-rsa",
        }
    }

    /// Returns the HTTP header carrying tokens for this scheme.
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::Ed25519 => "X-ED25519AUTHORIZATION",
            Self::Rsa => "X-RSAAUTHORIZATION",
        }
    }

    /// Resolves a scheme from its token header name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::UnsupportedScheme`] for unknown headers.
    pub fn from_header_name(name: &str) -> Result<Self, SchemeError> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.header_name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| SchemeError::UnsupportedScheme(name.to_string()))
    }
}

impl fmt::Display for SchemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemeId {
    type Err = SchemeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == value)
            .ok_or_else(|| SchemeError::UnsupportedScheme(value.to_string()))
    }
}

impl TryFrom<String> for SchemeId {
    type Error = SchemeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemeId> for String {
    fn from(value: SchemeId) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Signing and verification for one scheme.
pub trait SignatureScheme: Send + Sync {
    /// Returns the scheme this provider implements.
    fn identify(&self) -> SchemeId;

    /// Produces a detached signature over `message` with the private key
    /// matching `fingerprint`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyNotFound`] when no private key matches,
    /// [`SchemeError::KeyLocked`] when a sealed key cannot be unlocked, and
    /// [`SchemeError::SigningFailed`] for primitive failures.
    fn sign(&self, fingerprint: &Fingerprint, message: &[u8]) -> Result<Vec<u8>, SchemeError>;

    /// Verifies a detached signature with the public key matching
    /// `fingerprint`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyNotFound`] or [`SchemeError::InvalidSignature`].
    fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &[u8],
        message: &[u8],
    ) -> Result<(), SchemeError>;

    /// Validates a public key, computes its fingerprint, and adds it to the
    /// verification key ring. Importing the same key twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::InvalidKey`] for malformed keys.
    fn import_public_key(&self, public_key: &[u8]) -> Result<Fingerprint, SchemeError>;

    /// Imports a key file, including its private key when present.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError`] when the file belongs to another scheme, its
    /// fingerprint does not match the public key, or the key is malformed.
    fn import_key_file(&self, file: &KeyFile) -> Result<Fingerprint, SchemeError>;

    /// Generates a fresh key pair and returns it as a key file, sealing the
    /// private key when `passphrase` is given. The key is also imported.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError`] when generation or sealing fails.
    fn generate(&self, passphrase: Option<&str>) -> Result<KeyFile, SchemeError>;

    /// Returns true when a private key for `fingerprint` is held.
    fn has_private_key(&self, fingerprint: &Fingerprint) -> bool;
}

// ============================================================================
// SECTION: Multi-Key Verification
// ============================================================================

/// Tries each candidate fingerprint in order and returns the first whose key
/// verifies the signature.
///
/// When every candidate fails, the error from the last attempted
/// verification is returned, not the first.
///
/// # Errors
///
/// Returns the last verification error, or [`SchemeError::KeyNotFound`] when
/// `fingerprints` is empty.
pub fn try_multiple_key_verification(
    scheme: &dyn SignatureScheme,
    fingerprints: &[Fingerprint],
    signature: &[u8],
    message: &[u8],
) -> Result<Fingerprint, SchemeError> {
    let mut last_error =
        SchemeError::KeyNotFound(format!("no candidate keys for {}", scheme.identify()));
    for fingerprint in fingerprints {
        match scheme.verify(fingerprint, signature, message) {
            Ok(()) => return Ok(fingerprint.clone()),
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Runtime registry of scheme providers keyed by [`SchemeId`].
#[derive(Default, Clone)]
pub struct SchemeRegistry {
    /// Registered providers.
    providers: BTreeMap<SchemeId, Arc<dyn SignatureScheme>>,
}

impl SchemeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under the scheme it identifies as, replacing any
    /// previous provider for that scheme.
    pub fn register(&mut self, provider: Arc<dyn SignatureScheme>) {
        self.providers.insert(provider.identify(), provider);
    }

    /// Returns the provider for `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::UnsupportedScheme`] when none is registered.
    pub fn get(&self, scheme: SchemeId) -> Result<Arc<dyn SignatureScheme>, SchemeError> {
        self.providers
            .get(&scheme)
            .cloned()
            .ok_or_else(|| SchemeError::UnsupportedScheme(scheme.to_string()))
    }

    /// Iterates registered providers in scheme order.
    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn SignatureScheme>> {
        self.providers.values()
    }

    /// Returns the registered scheme identifiers.
    #[must_use]
    pub fn schemes(&self) -> Vec<SchemeId> {
        self.providers.keys().copied().collect()
    }
}

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeRegistry").field("schemes", &self.schemes()).finish()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Computes the fingerprint of a canonical public key encoding: uppercase hex
/// of the first [`FINGERPRINT_BYTES`] bytes of its SHA-256 digest.
///
/// # Errors
///
/// Returns [`SchemeError::InvalidKey`] if the digest cannot form a fingerprint.
pub fn fingerprint_of(public_key: &[u8]) -> Result<Fingerprint, SchemeError> {
    let digest = Sha256::digest(public_key);
    let hex = hex_encode_upper(&digest[.. FINGERPRINT_BYTES]);
    Fingerprint::parse(&hex).map_err(|err| SchemeError::InvalidKey(err.to_string()))
}

/// Encodes bytes as uppercase hex.
fn hex_encode_upper(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}
