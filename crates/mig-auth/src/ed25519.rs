// crates/mig-auth/src/ed25519.rs
// ============================================================================
// Module: Ed25519 Scheme
// Description: Ed25519 signatures with strict verification.
// Purpose: Default signature scheme for investigator keys.
// Dependencies: ed25519-dalek, rand, zeroize
// ============================================================================

//! ## Overview
//! Public keys are the raw 32-byte encoding and private keys are the 32-byte
//! seed. Verification uses `verify_strict`, rejecting small-order keys and
//! non-canonical signatures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ed25519_dalek::PUBLIC_KEY_LENGTH;
use ed25519_dalek::SECRET_KEY_LENGTH;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::provider::KeyAlgorithm;
use crate::provider::SchemeProvider;
use crate::scheme::SchemeError;
use crate::scheme::SchemeId;

// ============================================================================
// SECTION: Algorithm
// ============================================================================

/// Ed25519 primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Algorithm;

/// Ed25519 signature scheme provider.
pub type Ed25519Scheme = SchemeProvider<Ed25519Algorithm>;

impl KeyAlgorithm for Ed25519Algorithm {
    const SCHEME: SchemeId = SchemeId::Ed25519;

    fn canonical_public_key(public_key: &[u8]) -> Result<Vec<u8>, SchemeError> {
        Ok(verifying_key(public_key)?.to_bytes().to_vec())
    }

    fn public_from_private(private_key: &[u8]) -> Result<Vec<u8>, SchemeError> {
        Ok(signing_key(private_key)?.verifying_key().to_bytes().to_vec())
    }

    fn sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        let key = signing_key(private_key)?;
        let signature = key
            .try_sign(message)
            .map_err(|err| SchemeError::SigningFailed(err.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> Result<(), SchemeError> {
        let key = verifying_key(public_key)?;
        let signature = Signature::from_slice(signature)
            .map_err(|err| SchemeError::InvalidSignature(err.to_string()))?;
        key.verify_strict(message, &signature)
            .map_err(|err| SchemeError::InvalidSignature(err.to_string()))
    }

    fn generate() -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), SchemeError> {
        let key = SigningKey::generate(&mut OsRng);
        let public_key = key.verifying_key().to_bytes().to_vec();
        Ok((Zeroizing::new(key.to_bytes().to_vec()), public_key))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a raw public key.
fn verifying_key(bytes: &[u8]) -> Result<VerifyingKey, SchemeError> {
    let raw: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
        SchemeError::InvalidKey(format!("ed25519 public key must be {PUBLIC_KEY_LENGTH} bytes"))
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|err| SchemeError::InvalidKey(err.to_string()))
}

/// Parses a private key seed.
fn signing_key(bytes: &[u8]) -> Result<SigningKey, SchemeError> {
    let raw: Zeroizing<[u8; SECRET_KEY_LENGTH]> =
        Zeroizing::new(bytes.try_into().map_err(|_| {
            SchemeError::InvalidKey(format!(
                "ed25519 private key must be {SECRET_KEY_LENGTH} bytes"
            ))
        })?);
    Ok(SigningKey::from_bytes(&raw))
}
