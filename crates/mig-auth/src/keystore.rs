// crates/mig-auth/src/keystore.rs
// ============================================================================
// Module: Key Files
// Description: On-disk key file format and passphrase-sealed private keys.
// Purpose: Persist investigator keys with optional encryption at rest.
// Dependencies: argon2, base64, chacha20poly1305, rand, serde, zeroize
// ============================================================================

//! ## Overview
//! A [`KeyFile`] is a JSON document naming its scheme and fingerprint and
//! carrying the public key plus, optionally, the private key. Private keys are
//! either stored plain or sealed: Argon2id stretches the passphrase into a
//! 256-bit key (parameters and salt stored alongside) and ChaCha20-Poly1305
//! encrypts the key bytes. A wrong passphrase surfaces as an AEAD failure.
//!
//! Security posture: key files are untrusted input; size is bounded on read
//! and decrypted key bytes are zeroized on drop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use argon2::Algorithm;
use argon2::Argon2;
use argon2::Params;
use argon2::Version;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::ChaCha20Poly1305;
use chacha20poly1305::Nonce;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::aead::AeadCore;
use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::aead::OsRng as AeadRng;
use mig_core::Fingerprint;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::scheme::SchemeError;
use crate::scheme::SchemeId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum key file size in bytes.
pub const MAX_KEY_FILE_SIZE: u64 = 64 * 1024;
/// Salt length for passphrase stretching.
const SALT_BYTES: usize = 16;
/// ChaCha20-Poly1305 nonce length.
const NONCE_BYTES: usize = 12;
/// Derived key length.
const DERIVED_KEY_BYTES: usize = 32;
/// KDF label stored in sealed keys.
const KDF_ARGON2ID: &str = "argon2id";

// ============================================================================
// SECTION: Seal Parameters
// ============================================================================

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Iteration count.
    pub t_cost: u32,
    /// Parallelism.
    pub p_cost: u32,
}

impl SealParams {
    /// Parameters for keys unlocked interactively.
    #[must_use]
    pub const fn interactive() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }

    /// Builds the Argon2id instance for these parameters.
    fn argon2(self) -> Result<Argon2<'static>, SchemeError> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(DERIVED_KEY_BYTES))
            .map_err(|err| SchemeError::KeyStore(format!("argon2 parameters: {err}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for SealParams {
    fn default() -> Self {
        Self::interactive()
    }
}

// ============================================================================
// SECTION: Sealed Keys
// ============================================================================

/// Passphrase-encrypted private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Key derivation function label.
    pub kdf: String,
    /// Key derivation parameters.
    pub params: SealParams,
    /// Base64 salt.
    pub salt: String,
    /// Base64 AEAD nonce.
    pub nonce: String,
    /// Base64 ciphertext including the authentication tag.
    pub ciphertext: String,
}

impl SealedKey {
    /// Encrypts `secret` under `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyStore`] when derivation or encryption fails.
    pub fn seal(secret: &[u8], passphrase: &str, params: SealParams) -> Result<Self, SchemeError> {
        let mut salt = [0_u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(passphrase, &salt, params)?;
        let cipher = ChaCha20Poly1305::new(key.as_slice().into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut AeadRng);
        let ciphertext = cipher
            .encrypt(&nonce, secret)
            .map_err(|_| SchemeError::KeyStore("private key encryption failed".to_string()))?;
        Ok(Self {
            kdf: KDF_ARGON2ID.to_string(),
            params,
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Decrypts the key with `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyLocked`] when the passphrase is wrong and
    /// [`SchemeError::KeyStore`] when the envelope is malformed.
    pub fn open(&self, passphrase: &str) -> Result<Zeroizing<Vec<u8>>, SchemeError> {
        if self.kdf != KDF_ARGON2ID {
            return Err(SchemeError::KeyStore(format!("unsupported kdf {}", self.kdf)));
        }
        let salt = decode_field("salt", &self.salt)?;
        let nonce = decode_field("nonce", &self.nonce)?;
        if nonce.len() != NONCE_BYTES {
            return Err(SchemeError::KeyStore("sealed key nonce has the wrong length".to_string()));
        }
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;
        let key = derive_key(passphrase, &salt, self.params)?;
        let cipher = ChaCha20Poly1305::new(key.as_slice().into());
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| SchemeError::KeyLocked("passphrase does not unlock the key".to_string()))
    }
}

/// Private key storage form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrivateKeyMaterial {
    /// Unencrypted base64 key bytes.
    Plain {
        /// Base64 private key.
        key: String,
    },
    /// Passphrase-sealed key bytes.
    Sealed(SealedKey),
}

impl PrivateKeyMaterial {
    /// Wraps raw key bytes, sealing them when a passphrase is given.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyStore`] when sealing fails.
    pub fn from_secret(
        secret: &[u8],
        passphrase: Option<&str>,
        params: SealParams,
    ) -> Result<Self, SchemeError> {
        match passphrase {
            Some(passphrase) => Ok(Self::Sealed(SealedKey::seal(secret, passphrase, params)?)),
            None => Ok(Self::Plain {
                key: STANDARD.encode(secret),
            }),
        }
    }

    /// Returns true when the key is sealed.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { .. } => f.write_str("PrivateKeyMaterial::Plain(<redacted>)"),
            Self::Sealed(_) => f.write_str("PrivateKeyMaterial::Sealed(<redacted>)"),
        }
    }
}

// ============================================================================
// SECTION: Key Files
// ============================================================================

/// Serialized key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    /// Scheme the key belongs to.
    pub scheme: SchemeId,
    /// Fingerprint of the public key.
    pub fingerprint: Fingerprint,
    /// Base64 canonical public key encoding.
    pub public_key: String,
    /// Private key, absent for public-only files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKeyMaterial>,
}

impl KeyFile {
    /// Decodes the public key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::InvalidKey`] for malformed base64.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, SchemeError> {
        STANDARD.decode(&self.public_key).map_err(|err| SchemeError::InvalidKey(err.to_string()))
    }

    /// Returns a copy without the private key.
    #[must_use]
    pub fn public_only(&self) -> Self {
        Self {
            private_key: None,
            ..self.clone()
        }
    }

    /// Reads a key file, enforcing [`MAX_KEY_FILE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyStore`] on I/O, size, or parse failures.
    pub fn load(path: &Path) -> Result<Self, SchemeError> {
        let file = fs::File::open(path)
            .map_err(|err| SchemeError::KeyStore(format!("{}: {err}", path.display())))?;
        let mut bytes = Vec::new();
        file.take(MAX_KEY_FILE_SIZE + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| SchemeError::KeyStore(format!("{}: {err}", path.display())))?;
        if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > MAX_KEY_FILE_SIZE {
            return Err(SchemeError::KeyStore("key file exceeds size limit".to_string()));
        }
        let bytes = Zeroizing::new(bytes);
        serde_json::from_slice(&bytes)
            .map_err(|err| SchemeError::KeyStore(format!("key file parse error: {err}")))
    }

    /// Writes the key file as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::KeyStore`] on serialization or I/O failures.
    pub fn save(&self, path: &Path) -> Result<(), SchemeError> {
        let json = Zeroizing::new(
            serde_json::to_vec_pretty(self)
                .map_err(|err| SchemeError::KeyStore(format!("key file encode error: {err}")))?,
        );
        fs::write(path, json.as_slice())
            .map_err(|err| SchemeError::KeyStore(format!("{}: {err}", path.display())))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Stretches a passphrase into an AEAD key.
fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: SealParams,
) -> Result<Zeroizing<[u8; DERIVED_KEY_BYTES]>, SchemeError> {
    let mut key = Zeroizing::new([0_u8; DERIVED_KEY_BYTES]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
        .map_err(|err| SchemeError::KeyStore(format!("argon2 derivation: {err}")))?;
    Ok(key)
}

/// Decodes one base64 field of a sealed key.
fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, SchemeError> {
    STANDARD
        .decode(value)
        .map_err(|err| SchemeError::KeyStore(format!("sealed key {name} is not base64: {err}")))
}
