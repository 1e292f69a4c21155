// crates/mig-auth/src/acl.rs
// ============================================================================
// Module: Action ACL
// Description: Signer-threshold permissions and their evaluation.
// Purpose: Decide whether a set of signer fingerprints authorizes an action.
// Dependencies: mig-core, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`Permission`] requires a total number of signatures and a number of
//! authoritative signatures. [`verify_permission`] is a pure function over a
//! permission and a fingerprint set; [`Acl`] selects the permission for each
//! operation of an action by module name, falling back to
//! [`DEFAULT_PERMISSION`].
//!
//! Security posture: fingerprints are deduplicated before counting, so one
//! key signing twice counts once. Unknown fingerprints contribute nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use mig_core::Action;
use mig_core::Fingerprint;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Permission used for modules without a dedicated entry.
pub const DEFAULT_PERMISSION: &str = "default";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// ACL evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// The permission is misconfigured.
    #[error("invalid permission {permission}: {reason}")]
    InvalidPermission {
        /// Permission name.
        permission: String,
        /// Failure reason.
        reason: String,
    },
    /// Too few authoritative signers.
    #[error(
        "permission {permission} requires {required} authoritative signatures, got {got}"
    )]
    InsufficientAuthoritativeSignatures {
        /// Permission name.
        permission: String,
        /// Required authoritative count.
        required: u32,
        /// Authoritative signatures counted.
        got: u32,
    },
    /// Too few signers in total.
    #[error("permission {permission} requires {required} signatures, got {got}")]
    InsufficientSignatures {
        /// Permission name.
        permission: String,
        /// Required total count.
        required: u32,
        /// Signatures counted.
        got: u32,
    },
    /// Neither the module nor the default has a permission.
    #[error("no permission applies to module {0}")]
    NoPermission(String),
    /// Two permissions share a name.
    #[error("duplicate permission: {0}")]
    DuplicatePermission(String),
}

// ============================================================================
// SECTION: Permission
// ============================================================================

/// Named signer-threshold policy.
///
/// # Invariants
/// - `required_signatures >= 1`.
/// - The authoritative and non-authoritative lists are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Permission {
    /// Permission name; module names select permissions.
    pub name: String,
    /// Minimum number of counted signers.
    pub required_signatures: u32,
    /// Minimum number of authoritative signers.
    #[serde(default)]
    pub required_authoritative_signers: u32,
    /// Signers counting toward both thresholds.
    #[serde(default)]
    pub authoritative_signers: Vec<Fingerprint>,
    /// Signers counting toward the total only.
    #[serde(default)]
    pub non_authoritative_signers: Vec<Fingerprint>,
}

impl Permission {
    /// Checks the permission invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::InvalidPermission`] when the total threshold is
    /// zero, the name is empty, or a fingerprint appears in both lists.
    pub fn validate(&self) -> Result<(), AclError> {
        let invalid = |reason: String| AclError::InvalidPermission {
            permission: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if self.required_signatures < 1 {
            return Err(invalid("required_signatures must be at least 1".to_string()));
        }
        let authoritative: BTreeSet<&Fingerprint> = self.authoritative_signers.iter().collect();
        if let Some(shared) =
            self.non_authoritative_signers.iter().find(|fp| authoritative.contains(fp))
        {
            return Err(invalid(format!(
                "{shared} is listed as authoritative and non-authoritative"
            )));
        }
        Ok(())
    }
}

/// Checks whether `fingerprints` satisfy `permission`.
///
/// The authoritative threshold is checked before the total threshold.
///
/// # Errors
///
/// Returns [`AclError::InvalidPermission`] when `required_signatures` is
/// below one, otherwise the first unmet threshold.
pub fn verify_permission(
    permission: &Permission,
    fingerprints: &[Fingerprint],
) -> Result<(), AclError> {
    if permission.required_signatures < 1 {
        return Err(AclError::InvalidPermission {
            permission: permission.name.clone(),
            reason: "required_signatures must be at least 1".to_string(),
        });
    }
    let signers: BTreeSet<&Fingerprint> = fingerprints.iter().collect();
    let mut total: u32 = 0;
    let mut authoritative: u32 = 0;
    for signer in signers {
        if permission.authoritative_signers.contains(signer) {
            total = total.saturating_add(1);
            authoritative = authoritative.saturating_add(1);
        } else if permission.non_authoritative_signers.contains(signer) {
            total = total.saturating_add(1);
        }
    }
    if authoritative < permission.required_authoritative_signers {
        return Err(AclError::InsufficientAuthoritativeSignatures {
            permission: permission.name.clone(),
            required: permission.required_authoritative_signers,
            got: authoritative,
        });
    }
    if total < permission.required_signatures {
        return Err(AclError::InsufficientSignatures {
            permission: permission.name.clone(),
            required: permission.required_signatures,
            got: total,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: ACL
// ============================================================================

/// Permissions keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    /// Validated permissions.
    permissions: BTreeMap<String, Permission>,
}

impl Acl {
    /// Builds an ACL, validating every permission.
    ///
    /// # Errors
    ///
    /// Returns [`AclError`] for invalid or duplicate permissions.
    pub fn new<I>(permissions: I) -> Result<Self, AclError>
    where
        I: IntoIterator<Item = Permission>,
    {
        let mut map = BTreeMap::new();
        for permission in permissions {
            permission.validate()?;
            if map.contains_key(&permission.name) {
                return Err(AclError::DuplicatePermission(permission.name));
            }
            map.insert(permission.name.clone(), permission);
        }
        Ok(Self {
            permissions: map,
        })
    }

    /// Returns the permission governing `module`.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::NoPermission`] when neither `module` nor the
    /// default permission exists.
    pub fn permission_for(&self, module: &str) -> Result<&Permission, AclError> {
        self.permissions
            .get(module)
            .or_else(|| self.permissions.get(DEFAULT_PERMISSION))
            .ok_or_else(|| AclError::NoPermission(module.to_string()))
    }

    /// Checks every operation of `action` against its permission.
    ///
    /// Returns the names of the permissions applied, in operation order.
    ///
    /// # Errors
    ///
    /// Returns the first [`AclError`] encountered.
    pub fn verify_action(
        &self,
        action: &Action,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<String>, AclError> {
        let mut applied = Vec::with_capacity(action.operations.len());
        for operation in &action.operations {
            let permission = self.permission_for(&operation.module)?;
            verify_permission(permission, fingerprints)?;
            applied.push(permission.name.clone());
        }
        Ok(applied)
    }

    /// Returns the number of permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Returns true when the ACL has no permissions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Iterates permissions in name order.
    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }
}
