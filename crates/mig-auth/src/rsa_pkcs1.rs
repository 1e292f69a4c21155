// crates/mig-auth/src/rsa_pkcs1.rs
// ============================================================================
// Module: RSA Scheme
// Description: RSASSA-PKCS1-v1_5 signatures over SHA-256.
// Purpose: Support investigators holding RSA keys.
// Dependencies: rsa, sha2, rand, zeroize
// ============================================================================

//! ## Overview
//! Public keys are exchanged as SubjectPublicKeyInfo DER and private keys as
//! PKCS#8 DER. Keys shorter than [`MIN_RSA_BITS`] are rejected on import.
//! Signing is deterministic, so signing the same message twice yields the
//! same signature.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::RsaPublicKey;
use rsa::pkcs1v15::Signature;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs1v15::VerifyingKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::SignatureEncoding;
use rsa::signature::Signer;
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::provider::KeyAlgorithm;
use crate::provider::SchemeProvider;
use crate::scheme::SchemeError;
use crate::scheme::SchemeId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Minimum accepted modulus size.
pub const MIN_RSA_BITS: usize = 2048;
/// Modulus size for generated keys.
pub const GENERATED_RSA_BITS: usize = 3072;

// ============================================================================
// SECTION: Algorithm
// ============================================================================

/// RSA PKCS#1 v1.5 / SHA-256 primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaAlgorithm;

/// RSA signature scheme provider.
pub type RsaScheme = SchemeProvider<RsaAlgorithm>;

impl KeyAlgorithm for RsaAlgorithm {
    const SCHEME: SchemeId = SchemeId::Rsa;

    fn canonical_public_key(public_key: &[u8]) -> Result<Vec<u8>, SchemeError> {
        encode_public(&public_key_from_der(public_key)?)
    }

    fn public_from_private(private_key: &[u8]) -> Result<Vec<u8>, SchemeError> {
        let key = private_key_from_der(private_key)?;
        encode_public(&key.to_public_key())
    }

    fn sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        let key = SigningKey::<Sha256>::new(private_key_from_der(private_key)?);
        let signature =
            key.try_sign(message).map_err(|err| SchemeError::SigningFailed(err.to_string()))?;
        Ok(signature.to_vec())
    }

    fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> Result<(), SchemeError> {
        let key = VerifyingKey::<Sha256>::new(public_key_from_der(public_key)?);
        let signature = Signature::try_from(signature)
            .map_err(|err| SchemeError::InvalidSignature(err.to_string()))?;
        key.verify(message, &signature)
            .map_err(|err| SchemeError::InvalidSignature(err.to_string()))
    }

    fn generate() -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), SchemeError> {
        let key = RsaPrivateKey::new(&mut OsRng, GENERATED_RSA_BITS)
            .map_err(|err| SchemeError::SigningFailed(format!("rsa key generation: {err}")))?;
        let private_der = key
            .to_pkcs8_der()
            .map_err(|err| SchemeError::InvalidKey(format!("rsa private key encoding: {err}")))?;
        let public_key = encode_public(&key.to_public_key())?;
        Ok((Zeroizing::new(private_der.as_bytes().to_vec()), public_key))
    }
}

// ============================================================================
// SECTION: Key Conversion
// ============================================================================

/// Converts a PKCS#8 PEM private key into the DER bytes used in key files.
///
/// # Errors
///
/// Returns [`SchemeError::InvalidKey`] when the PEM is not an RSA PKCS#8 key.
pub fn private_key_der_from_pem(pem: &str) -> Result<Zeroizing<Vec<u8>>, SchemeError> {
    let key = RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|err| SchemeError::InvalidKey(format!("rsa private key pem: {err}")))?;
    check_size(&key.to_public_key())?;
    let der = key
        .to_pkcs8_der()
        .map_err(|err| SchemeError::InvalidKey(format!("rsa private key encoding: {err}")))?;
    Ok(Zeroizing::new(der.as_bytes().to_vec()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses and size-checks an SPKI DER public key.
fn public_key_from_der(bytes: &[u8]) -> Result<RsaPublicKey, SchemeError> {
    let key = RsaPublicKey::from_public_key_der(bytes)
        .map_err(|err| SchemeError::InvalidKey(format!("rsa public key: {err}")))?;
    check_size(&key)?;
    Ok(key)
}

/// Parses and size-checks a PKCS#8 DER private key.
fn private_key_from_der(bytes: &[u8]) -> Result<RsaPrivateKey, SchemeError> {
    let key = RsaPrivateKey::from_pkcs8_der(bytes)
        .map_err(|err| SchemeError::InvalidKey(format!("rsa private key: {err}")))?;
    check_size(&key.to_public_key())?;
    Ok(key)
}

/// Encodes a public key as SPKI DER.
fn encode_public(key: &RsaPublicKey) -> Result<Vec<u8>, SchemeError> {
    key.to_public_key_der()
        .map(|der| der.as_bytes().to_vec())
        .map_err(|err| SchemeError::InvalidKey(format!("rsa public key encoding: {err}")))
}

/// Rejects keys below [`MIN_RSA_BITS`].
fn check_size(key: &RsaPublicKey) -> Result<(), SchemeError> {
    let bits = key.size() * 8;
    if bits < MIN_RSA_BITS {
        return Err(SchemeError::InvalidKey(format!(
            "rsa key has {bits} bits, minimum is {MIN_RSA_BITS}"
        )));
    }
    Ok(())
}
