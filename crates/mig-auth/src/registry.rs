// crates/mig-auth/src/registry.rs
// ============================================================================
// Module: Investigator Registry
// Description: Registered investigators, their keys, and lookup by fingerprint.
// Purpose: Classify signers and expose the active verification key set.
// Dependencies: base64, mig-core, serde, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! Investigators are registered with a name and a public key; the key is
//! validated and fingerprinted by its scheme provider. Investigators are never
//! deleted: disabling one removes its keys from
//! [`InvestigatorRegistry::list_active_public_keys`], so its signatures stop
//! verifying at the authority.
//!
//! Invariants:
//! - A fingerprint belongs to at most one investigator in
//!   [`InMemoryInvestigatorRegistry`].
//! - [`InvestigatorRegistry::resolve`] succeeds only for exactly one match.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mig_core::Fingerprint;
use mig_core::InvestigatorId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::scheme::SchemeError;
use crate::scheme::SchemeId;
use crate::scheme::SchemeRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Investigator registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No investigator has the identifier.
    #[error("investigator not found: {0}")]
    NotFound(InvestigatorId),
    /// No investigator holds the fingerprint.
    #[error("no investigator holds fingerprint {0}")]
    UnknownFingerprint(Fingerprint),
    /// More than one investigator holds the fingerprint.
    #[error("fingerprint {fingerprint} resolves to {count} investigators")]
    AmbiguousFingerprint {
        /// Fingerprint looked up.
        fingerprint: Fingerprint,
        /// Number of matches.
        count: usize,
    },
    /// The fingerprint is already registered.
    #[error("fingerprint {0} is already registered")]
    DuplicateFingerprint(Fingerprint),
    /// Investigator name is empty.
    #[error("investigator name is empty")]
    MissingName,
    /// Unknown permission label.
    #[error("invalid investigator permission: {0}")]
    InvalidPermission(String),
    /// Public key was rejected by its scheme.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    /// Registry storage failed.
    #[error("investigator registry storage error: {0}")]
    Storage(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Investigator lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigatorStatus {
    /// Signatures are accepted.
    Active,
    /// Signatures are no longer accepted.
    Disabled,
}

/// Administrative permissions, independent of action ACLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestigatorPermissions {
    /// Manage loaders.
    #[serde(default)]
    pub loaders: bool,
    /// Manage manifests.
    #[serde(default)]
    pub manifests: bool,
    /// Manage investigators.
    #[serde(default)]
    pub admin: bool,
}

impl InvestigatorPermissions {
    /// Every permission.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            loaders: true,
            manifests: true,
            admin: true,
        }
    }

    /// Parses permission labels (`loaders`, `manifests`, `admin`, with an
    /// optional `perm` prefix), ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPermission`] for unknown labels.
    pub fn from_names<I, S>(names: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut permissions = Self::default();
        for name in names {
            let raw = name.as_ref().trim().to_ascii_lowercase();
            match raw.strip_prefix("perm").unwrap_or(&raw) {
                "loaders" => permissions.loaders = true,
                "manifests" => permissions.manifests = true,
                "admin" => permissions.admin = true,
                _ => return Err(RegistryError::InvalidPermission(name.as_ref().to_string())),
            }
        }
        Ok(permissions)
    }
}

/// One registered public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigatorKey {
    /// Scheme the key belongs to.
    pub scheme: SchemeId,
    /// Key fingerprint.
    pub fingerprint: Fingerprint,
    /// Base64 canonical public key.
    pub public_key: String,
}

/// Registered human identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigator {
    /// Registry identifier.
    pub id: InvestigatorId,
    /// Display name.
    pub name: String,
    /// Registered keys; never empty.
    pub keys: Vec<InvestigatorKey>,
    /// Lifecycle status.
    pub status: InvestigatorStatus,
    /// Registration time.
    #[serde(rename = "createdat", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last status or permission change.
    #[serde(rename = "lastmodified", with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// Administrative permissions.
    pub permissions: InvestigatorPermissions,
}

impl Investigator {
    /// Returns true when the investigator holds `fingerprint`.
    #[must_use]
    pub fn holds(&self, fingerprint: &Fingerprint) -> bool {
        self.keys.iter().any(|key| &key.fingerprint == fingerprint)
    }

    /// Returns the investigator's fingerprints.
    #[must_use]
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.keys.iter().map(|key| key.fingerprint.clone()).collect()
    }
}

/// Registration request.
#[derive(Debug, Clone)]
pub struct NewInvestigator {
    /// Display name.
    pub name: String,
    /// Scheme of the public key.
    pub scheme: SchemeId,
    /// Public key in any encoding its scheme accepts.
    pub public_key: Vec<u8>,
    /// Administrative permissions.
    pub permissions: InvestigatorPermissions,
}

/// Active verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePublicKey {
    /// Owning investigator.
    pub investigator: InvestigatorId,
    /// Key fingerprint.
    pub fingerprint: Fingerprint,
    /// Canonical public key bytes.
    pub public_key: Vec<u8>,
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Storage-independent investigator registry.
pub trait InvestigatorRegistry: Send + Sync {
    /// Registers an investigator, validating and fingerprinting the key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the name is empty, the key is invalid,
    /// or the fingerprint is already registered.
    fn register(
        &self,
        request: NewInvestigator,
        now: OffsetDateTime,
    ) -> Result<Investigator, RegistryError>;

    /// Returns the investigator with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown identifiers.
    fn get(&self, id: InvestigatorId) -> Result<Investigator, RegistryError>;

    /// Changes an investigator's status.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown identifiers.
    fn set_status(
        &self,
        id: InvestigatorId,
        status: InvestigatorStatus,
        now: OffsetDateTime,
    ) -> Result<Investigator, RegistryError>;

    /// Replaces an investigator's administrative permissions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown identifiers.
    fn set_permissions(
        &self,
        id: InvestigatorId,
        permissions: InvestigatorPermissions,
        now: OffsetDateTime,
    ) -> Result<Investigator, RegistryError>;

    /// Lists public keys of active investigators for `scheme`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] when the registry cannot be read.
    fn list_active_public_keys(&self, scheme: SchemeId)
    -> Result<Vec<ActivePublicKey>, RegistryError>;

    /// Resolves a fingerprint to the one investigator holding it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownFingerprint`] or
    /// [`RegistryError::AmbiguousFingerprint`].
    fn resolve(&self, fingerprint: &Fingerprint) -> Result<Investigator, RegistryError>;
}

// ============================================================================
// SECTION: In-Memory Registry
// ============================================================================

/// Investigator registry held in memory.
#[derive(Debug)]
pub struct InMemoryInvestigatorRegistry {
    /// Providers used to validate keys.
    schemes: Arc<SchemeRegistry>,
    /// Investigators by identifier.
    investigators: RwLock<BTreeMap<InvestigatorId, Investigator>>,
}

impl InMemoryInvestigatorRegistry {
    /// Creates an empty registry validating keys with `schemes`.
    #[must_use]
    pub fn new(schemes: Arc<SchemeRegistry>) -> Self {
        Self {
            schemes,
            investigators: RwLock::new(BTreeMap::new()),
        }
    }

    /// Applies `update` to one investigator and stamps the modification time.
    fn update<F>(
        &self,
        id: InvestigatorId,
        now: OffsetDateTime,
        update: F,
    ) -> Result<Investigator, RegistryError>
    where
        F: FnOnce(&mut Investigator),
    {
        let mut investigators = self
            .investigators
            .write()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".to_string()))?;
        let investigator = investigators.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        update(investigator);
        investigator.last_modified = now;
        Ok(investigator.clone())
    }
}

impl InvestigatorRegistry for InMemoryInvestigatorRegistry {
    fn register(
        &self,
        request: NewInvestigator,
        now: OffsetDateTime,
    ) -> Result<Investigator, RegistryError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        let provider = self.schemes.get(request.scheme)?;
        let fingerprint = provider.import_public_key(&request.public_key)?;
        let mut investigators = self
            .investigators
            .write()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".to_string()))?;
        if investigators.values().any(|existing| existing.holds(&fingerprint)) {
            return Err(RegistryError::DuplicateFingerprint(fingerprint));
        }
        let next = investigators.keys().next_back().map_or(1, |id| id.get() + 1);
        let id = InvestigatorId::new(next);
        let investigator = Investigator {
            id,
            name: name.to_string(),
            keys: vec![InvestigatorKey {
                scheme: request.scheme,
                fingerprint: fingerprint.clone(),
                public_key: STANDARD.encode(&request.public_key),
            }],
            status: InvestigatorStatus::Active,
            created_at: now,
            last_modified: now,
            permissions: request.permissions,
        };
        investigators.insert(id, investigator.clone());
        info!(
            investigator = %id,
            fingerprint = %fingerprint,
            scheme = %request.scheme,
            "investigator registered"
        );
        Ok(investigator)
    }

    fn get(&self, id: InvestigatorId) -> Result<Investigator, RegistryError> {
        let investigators = self
            .investigators
            .read()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".to_string()))?;
        investigators.get(&id).cloned().ok_or(RegistryError::NotFound(id))
    }

    fn set_status(
        &self,
        id: InvestigatorId,
        status: InvestigatorStatus,
        now: OffsetDateTime,
    ) -> Result<Investigator, RegistryError> {
        self.update(id, now, |investigator| investigator.status = status)
    }

    fn set_permissions(
        &self,
        id: InvestigatorId,
        permissions: InvestigatorPermissions,
        now: OffsetDateTime,
    ) -> Result<Investigator, RegistryError> {
        self.update(id, now, |investigator| investigator.permissions = permissions)
    }

    fn list_active_public_keys(
        &self,
        scheme: SchemeId,
    ) -> Result<Vec<ActivePublicKey>, RegistryError> {
        let investigators = self
            .investigators
            .read()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".to_string()))?;
        let mut keys = Vec::new();
        for investigator in investigators.values() {
            if investigator.status != InvestigatorStatus::Active {
                continue;
            }
            for key in investigator.keys.iter().filter(|key| key.scheme == scheme) {
                let public_key = STANDARD
                    .decode(&key.public_key)
                    .map_err(|err| RegistryError::Storage(err.to_string()))?;
                keys.push(ActivePublicKey {
                    investigator: investigator.id,
                    fingerprint: key.fingerprint.clone(),
                    public_key,
                });
            }
        }
        Ok(keys)
    }

    fn resolve(&self, fingerprint: &Fingerprint) -> Result<Investigator, RegistryError> {
        let investigators = self
            .investigators
            .read()
            .map_err(|_| RegistryError::Storage("registry lock poisoned".to_string()))?;
        let mut matches =
            investigators.values().filter(|investigator| investigator.holds(fingerprint));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Ok(only.clone()),
            (None, _) => Err(RegistryError::UnknownFingerprint(fingerprint.clone())),
            (Some(_), Some(_)) => Err(RegistryError::AmbiguousFingerprint {
                fingerprint: fingerprint.clone(),
                count: 2 + matches.count(),
            }),
        }
    }
}
