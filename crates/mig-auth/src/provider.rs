// crates/mig-auth/src/provider.rs
// ============================================================================
// Module: Scheme Provider
// Description: Key ring and unlock logic shared by every signature scheme.
// Purpose: Implement the signing contract once over pluggable algorithms.
// Dependencies: base64, mig-core, tracing, zeroize
// ============================================================================

//! ## Overview
//! [`SchemeProvider`] owns a key ring of imported keys and implements
//! [`SignatureScheme`] for any [`KeyAlgorithm`]. Algorithms only supply the
//! primitive operations over canonical key encodings; the provider handles
//! fingerprints, key files, sealed keys, and passphrase retries.
//!
//! Unlock order for sealed keys: cached passphrase, then (holding the prompt
//! lock) the cache again, then up to [`MAX_UNLOCK_ATTEMPTS`] answers from the
//! passphrase source. The first passphrase that opens the key is cached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::RwLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mig_core::Fingerprint;
use tracing::debug;
use tracing::warn;
use zeroize::Zeroizing;

use crate::ed25519::Ed25519Scheme;
use crate::keystore::KeyFile;
use crate::keystore::PrivateKeyMaterial;
use crate::keystore::SealParams;
use crate::keystore::SealedKey;
use crate::passphrase::MAX_UNLOCK_ATTEMPTS;
use crate::passphrase::NoPassphrase;
use crate::passphrase::PassphraseCache;
use crate::passphrase::PassphraseSource;
use crate::rsa_pkcs1::RsaScheme;
use crate::scheme::SchemeError;
use crate::scheme::SchemeId;
use crate::scheme::SchemeRegistry;
use crate::scheme::SignatureScheme;
use crate::scheme::fingerprint_of;

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Primitive operations of one signature algorithm.
///
/// Public keys are exchanged in the algorithm's canonical encoding, which is
/// also what fingerprints are computed over. Private keys are opaque bytes.
pub trait KeyAlgorithm: Send + Sync + 'static {
    /// Scheme implemented by the algorithm.
    const SCHEME: SchemeId;

    /// Validates a public key and returns its canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::InvalidKey`] for malformed or weak keys.
    fn canonical_public_key(public_key: &[u8]) -> Result<Vec<u8>, SchemeError>;

    /// Derives the canonical public key from private key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::InvalidKey`] for malformed keys.
    fn public_from_private(private_key: &[u8]) -> Result<Vec<u8>, SchemeError>;

    /// Signs `message`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::SigningFailed`] or [`SchemeError::InvalidKey`].
    fn sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, SchemeError>;

    /// Verifies a detached signature.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::InvalidSignature`] when it does not verify.
    fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> Result<(), SchemeError>;

    /// Generates a key pair, returning `(private, canonical public)`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::SigningFailed`] when generation fails.
    fn generate() -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), SchemeError>;
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Key ring entry.
struct StoredKey {
    /// Canonical public key.
    public_key: Vec<u8>,
    /// Private key, when held.
    private_key: Option<PrivateKeyMaterial>,
}

/// Signature scheme backed by an in-memory key ring.
pub struct SchemeProvider<A: KeyAlgorithm> {
    /// Keys by fingerprint.
    keys: RwLock<BTreeMap<Fingerprint, StoredKey>>,
    /// Passphrases that unlocked sealed keys.
    cache: Arc<PassphraseCache>,
    /// Where passphrases come from.
    source: Arc<dyn PassphraseSource>,
    /// Parameters used when sealing generated keys.
    seal_params: SealParams,
    /// Algorithm marker.
    algorithm: PhantomData<fn() -> A>,
}

impl<A: KeyAlgorithm> SchemeProvider<A> {
    /// Creates a provider with an empty key ring and no passphrase source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(BTreeMap::new()),
            cache: Arc::new(PassphraseCache::new()),
            source: Arc::new(NoPassphrase),
            seal_params: SealParams::default(),
            algorithm: PhantomData,
        }
    }

    /// Uses `source` to unlock sealed keys.
    #[must_use]
    pub fn with_passphrase_source(mut self, source: Arc<dyn PassphraseSource>) -> Self {
        self.source = source;
        self
    }

    /// Shares `cache` with this provider.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<PassphraseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Uses `params` when sealing generated keys.
    #[must_use]
    pub const fn with_seal_params(mut self, params: SealParams) -> Self {
        self.seal_params = params;
        self
    }

    /// Returns the provider's passphrase cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<PassphraseCache> {
        &self.cache
    }

    /// Inserts a key, keeping an existing private key when the new entry has none.
    fn insert(&self, fingerprint: Fingerprint, entry: StoredKey) -> Result<(), SchemeError> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| SchemeError::KeyStore("key ring lock poisoned".to_string()))?;
        match keys.get_mut(&fingerprint) {
            Some(existing) if entry.private_key.is_none() => {
                existing.public_key = entry.public_key;
            }
            _ => {
                keys.insert(fingerprint, entry);
            }
        }
        Ok(())
    }

    /// Returns the private key material for `fingerprint`.
    fn private_material(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<PrivateKeyMaterial, SchemeError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| SchemeError::KeyStore("key ring lock poisoned".to_string()))?;
        keys.get(fingerprint)
            .and_then(|entry| entry.private_key.clone())
            .ok_or_else(|| SchemeError::KeyNotFound(fingerprint.to_string()))
    }

    /// Returns usable private key bytes, unlocking a sealed key if needed.
    fn unlock(&self, fingerprint: &Fingerprint) -> Result<Zeroizing<Vec<u8>>, SchemeError> {
        match self.private_material(fingerprint)? {
            PrivateKeyMaterial::Plain { key } => STANDARD
                .decode(key)
                .map(Zeroizing::new)
                .map_err(|err| SchemeError::InvalidKey(err.to_string())),
            PrivateKeyMaterial::Sealed(sealed) => self.unlock_sealed(fingerprint, &sealed),
        }
    }

    /// Opens a sealed key through the cache and the passphrase source.
    fn unlock_sealed(
        &self,
        fingerprint: &Fingerprint,
        sealed: &SealedKey,
    ) -> Result<Zeroizing<Vec<u8>>, SchemeError> {
        if let Some(secret) = self.try_cached(fingerprint, sealed)? {
            return Ok(secret);
        }
        let _prompt = self.cache.prompt_guard();
        if let Some(secret) = self.try_cached(fingerprint, sealed)? {
            return Ok(secret);
        }
        for attempt in 1 ..= MAX_UNLOCK_ATTEMPTS {
            let Some(passphrase) = self.source.passphrase(fingerprint, attempt)? else {
                break;
            };
            match sealed.open(&passphrase) {
                Ok(secret) => {
                    self.cache.store(fingerprint, passphrase);
                    debug!(fingerprint = %fingerprint, attempt, "sealed key unlocked");
                    return Ok(secret);
                }
                Err(SchemeError::KeyLocked(_)) => {
                    warn!(fingerprint = %fingerprint, attempt, "passphrase rejected");
                }
                Err(err) => return Err(err),
            }
        }
        Err(SchemeError::KeyLocked(format!(
            "{fingerprint}: no passphrase unlocked the key within {MAX_UNLOCK_ATTEMPTS} attempts"
        )))
    }

    /// Tries the cached passphrase, forgetting it when it no longer works.
    fn try_cached(
        &self,
        fingerprint: &Fingerprint,
        sealed: &SealedKey,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, SchemeError> {
        let Some(passphrase) = self.cache.get(fingerprint) else {
            return Ok(None);
        };
        match sealed.open(&passphrase) {
            Ok(secret) => Ok(Some(secret)),
            Err(SchemeError::KeyLocked(_)) => {
                self.cache.forget(fingerprint);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl<A: KeyAlgorithm> Default for SchemeProvider<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: KeyAlgorithm> fmt::Debug for SchemeProvider<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.read().map(|keys| keys.len()).unwrap_or_default();
        f.debug_struct("SchemeProvider")
            .field("scheme", &A::SCHEME.as_str())
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

impl<A: KeyAlgorithm> SignatureScheme for SchemeProvider<A> {
    fn identify(&self) -> SchemeId {
        A::SCHEME
    }

    fn sign(&self, fingerprint: &Fingerprint, message: &[u8]) -> Result<Vec<u8>, SchemeError> {
        let secret = self.unlock(fingerprint)?;
        A::sign(&secret, message)
    }

    fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &[u8],
        message: &[u8],
    ) -> Result<(), SchemeError> {
        let public_key = {
            let keys = self
                .keys
                .read()
                .map_err(|_| SchemeError::KeyStore("key ring lock poisoned".to_string()))?;
            keys.get(fingerprint)
                .map(|entry| entry.public_key.clone())
                .ok_or_else(|| SchemeError::KeyNotFound(fingerprint.to_string()))?
        };
        A::verify(&public_key, signature, message)
    }

    fn import_public_key(&self, public_key: &[u8]) -> Result<Fingerprint, SchemeError> {
        let canonical = A::canonical_public_key(public_key)?;
        let fingerprint = fingerprint_of(&canonical)?;
        self.insert(
            fingerprint.clone(),
            StoredKey {
                public_key: canonical,
                private_key: None,
            },
        )?;
        Ok(fingerprint)
    }

    fn import_key_file(&self, file: &KeyFile) -> Result<Fingerprint, SchemeError> {
        if file.scheme != A::SCHEME {
            return Err(SchemeError::UnsupportedScheme(format!(
                "key file is {}, provider is {}",
                file.scheme,
                A::SCHEME
            )));
        }
        let canonical = A::canonical_public_key(&file.public_key_bytes()?)?;
        let fingerprint = fingerprint_of(&canonical)?;
        if fingerprint != file.fingerprint {
            return Err(SchemeError::InvalidKey(format!(
                "key file fingerprint {} does not match public key {fingerprint}",
                file.fingerprint
            )));
        }
        if let Some(PrivateKeyMaterial::Plain { key }) = &file.private_key {
            let secret = Zeroizing::new(
                STANDARD.decode(key).map_err(|err| SchemeError::InvalidKey(err.to_string()))?,
            );
            if A::public_from_private(&secret)? != canonical {
                return Err(SchemeError::InvalidKey(
                    "private key does not match public key".to_string(),
                ));
            }
        }
        self.insert(
            fingerprint.clone(),
            StoredKey {
                public_key: canonical,
                private_key: file.private_key.clone(),
            },
        )?;
        debug!(fingerprint = %fingerprint, scheme = %A::SCHEME, "key file imported");
        Ok(fingerprint)
    }

    fn generate(&self, passphrase: Option<&str>) -> Result<KeyFile, SchemeError> {
        let (secret, public_key) = A::generate()?;
        let fingerprint = fingerprint_of(&public_key)?;
        let private_key = PrivateKeyMaterial::from_secret(&secret, passphrase, self.seal_params)?;
        let file = KeyFile {
            scheme: A::SCHEME,
            fingerprint,
            public_key: STANDARD.encode(&public_key),
            private_key: Some(private_key),
        };
        self.import_key_file(&file)?;
        Ok(file)
    }

    fn has_private_key(&self, fingerprint: &Fingerprint) -> bool {
        self.keys
            .read()
            .map(|keys| keys.get(fingerprint).is_some_and(|entry| entry.private_key.is_some()))
            .unwrap_or(false)
    }
}

// ============================================================================
// SECTION: Registry Construction
// ============================================================================

/// Builds a registry holding every supported scheme.
///
/// All providers share `cache` and `source`.
#[must_use]
pub fn standard_schemes(
    cache: Arc<PassphraseCache>,
    source: Arc<dyn PassphraseSource>,
    seal_params: SealParams,
) -> SchemeRegistry {
    let mut registry = SchemeRegistry::new();
    registry.register(Arc::new(
        Ed25519Scheme::new()
            .with_cache(Arc::clone(&cache))
            .with_passphrase_source(Arc::clone(&source))
            .with_seal_params(seal_params),
    ));
    registry.register(Arc::new(
        RsaScheme::new()
            .with_cache(cache)
            .with_passphrase_source(source)
            .with_seal_params(seal_params),
    ));
    registry
}
