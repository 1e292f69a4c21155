// crates/mig-auth/src/authority.rs
// ============================================================================
// Module: Action Authority
// Description: Authority-side request authentication and action acceptance.
// Purpose: Admit only valid, signed, ACL-satisfying actions into the store.
// Dependencies: base64, mig-core, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! [`ActionAuthority::accept`] runs the acceptance pipeline for a submitted
//! action:
//! 1. lifecycle validation at the authority clock;
//! 2. verification of every signature against the active keys of every
//!    registered scheme;
//! 3. resolution of each signer to exactly one investigator;
//! 4. ACL evaluation for every operation;
//! 5. identifier assignment, counter reset, and persistence.
//!
//! A failure at any step rejects the action before it reaches the
//! [`ActionStore`]. Every decision is reported to the [`AuditSink`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mig_core::Action;
use mig_core::ActionCounters;
use mig_core::ActionId;
use mig_core::ActionStatus;
use mig_core::Clock;
use mig_core::CommandStatus;
use mig_core::CountersError;
use mig_core::Fingerprint;
use mig_core::IdGenerator;
use mig_core::LifecycleError;
use mig_core::OperationError;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use tracing::debug;
use tracing::info;

use crate::acl::Acl;
use crate::acl::AclError;
use crate::audit::ACTION_EVENT;
use crate::audit::AuditSink;
use crate::audit::AuthAuditEvent;
use crate::audit::TOKEN_EVENT;
use crate::registry::Investigator;
use crate::registry::InvestigatorRegistry;
use crate::registry::RegistryError;
use crate::scheme::SchemeError;
use crate::scheme::SchemeId;
use crate::scheme::SchemeRegistry;
use crate::scheme::SignatureScheme;
use crate::scheme::try_multiple_key_verification;
use crate::token::DEFAULT_TOKEN_WINDOW;
use crate::token::TokenError;
use crate::token::verify_signed_token;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authority errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// The action failed lifecycle validation.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The signing payload could not be built.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// A signature did not verify under any active key.
    #[error("signature {index} rejected: {source}")]
    Signature {
        /// Position of the signature on the action.
        index: usize,
        /// Last verification error.
        source: SchemeError,
    },
    /// A signer could not be resolved to one investigator.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The signers do not satisfy the ACL.
    #[error(transparent)]
    Acl(#[from] AclError),
    /// The auth token was rejected.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Counter bookkeeping failed.
    #[error(transparent)]
    Counters(#[from] CountersError),
    /// The action is not stored.
    #[error("action not found: {0}")]
    NotFound(ActionId),
    /// The action store failed.
    #[error("action store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Action Store
// ============================================================================

/// Persistence for accepted actions.
pub trait ActionStore: Send + Sync {
    /// Stores or replaces an action keyed by its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Store`] when the write fails or the action
    /// has no identifier.
    fn put(&self, action: &Action) -> Result<(), AuthorityError>;

    /// Loads an action.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::NotFound`] for unknown identifiers.
    fn get(&self, id: ActionId) -> Result<Action, AuthorityError>;

    /// Applies `apply` to a stored action and persists the result as one
    /// step. Concurrent updates of the same action are serialized, and the
    /// stored action is left unchanged when `apply` fails.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::NotFound`] for unknown identifiers, the
    /// error returned by `apply`, or [`AuthorityError::Store`] when the store
    /// fails.
    fn update(
        &self,
        id: ActionId,
        apply: &mut dyn FnMut(&mut Action) -> Result<(), AuthorityError>,
    ) -> Result<Action, AuthorityError>;

    /// Returns the number of stored actions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Store`] when the store cannot be read.
    fn len(&self) -> Result<usize, AuthorityError>;
}

/// Action store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryActionStore {
    /// Actions by identifier.
    actions: RwLock<BTreeMap<ActionId, Action>>,
}

impl InMemoryActionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionStore for InMemoryActionStore {
    fn put(&self, action: &Action) -> Result<(), AuthorityError> {
        let id = action
            .id
            .ok_or_else(|| AuthorityError::Store("action has no identifier".to_string()))?;
        let mut actions = self
            .actions
            .write()
            .map_err(|_| AuthorityError::Store("action store lock poisoned".to_string()))?;
        actions.insert(id, action.clone());
        Ok(())
    }

    fn get(&self, id: ActionId) -> Result<Action, AuthorityError> {
        let actions = self
            .actions
            .read()
            .map_err(|_| AuthorityError::Store("action store lock poisoned".to_string()))?;
        actions.get(&id).cloned().ok_or(AuthorityError::NotFound(id))
    }

    fn update(
        &self,
        id: ActionId,
        apply: &mut dyn FnMut(&mut Action) -> Result<(), AuthorityError>,
    ) -> Result<Action, AuthorityError> {
        let mut actions = self
            .actions
            .write()
            .map_err(|_| AuthorityError::Store("action store lock poisoned".to_string()))?;
        let stored = actions.get_mut(&id).ok_or(AuthorityError::NotFound(id))?;
        let mut action = stored.clone();
        apply(&mut action)?;
        *stored = action.clone();
        Ok(action)
    }

    fn len(&self) -> Result<usize, AuthorityError> {
        let actions = self
            .actions
            .read()
            .map_err(|_| AuthorityError::Store("action store lock poisoned".to_string()))?;
        Ok(actions.len())
    }
}

// ============================================================================
// SECTION: Authority
// ============================================================================

/// Authority that authenticates requests and accepts actions.
pub struct ActionAuthority {
    /// Verification providers.
    schemes: Arc<SchemeRegistry>,
    /// Investigator registry.
    investigators: Arc<dyn InvestigatorRegistry>,
    /// Action ACL.
    acl: Acl,
    /// Accepted actions.
    store: Arc<dyn ActionStore>,
    /// Authority clock.
    clock: Arc<dyn Clock>,
    /// Action identifier generator.
    ids: IdGenerator,
    /// Decision audit sink.
    audit: Arc<dyn AuditSink>,
    /// Token acceptance window.
    token_window: Duration,
}

impl ActionAuthority {
    /// Creates an authority with the default token window.
    #[must_use]
    pub fn new(
        schemes: Arc<SchemeRegistry>,
        investigators: Arc<dyn InvestigatorRegistry>,
        acl: Acl,
        store: Arc<dyn ActionStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            schemes,
            investigators,
            acl,
            store,
            clock,
            ids: IdGenerator::new(),
            audit,
            token_window: DEFAULT_TOKEN_WINDOW,
        }
    }

    /// Overrides the token acceptance window.
    #[must_use]
    pub const fn with_token_window(mut self, window: Duration) -> Self {
        self.token_window = window;
        self
    }

    /// Returns the action store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.store
    }

    /// Authenticates a request from its scheme header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] when the header names no supported scheme,
    /// the token is rejected, or the signer is not exactly one investigator.
    pub fn authenticate(
        &self,
        header_name: &str,
        header_value: &str,
    ) -> Result<Investigator, AuthorityError> {
        let result = self.authenticate_inner(header_name, header_value);
        let event = match &result {
            Ok((scheme, fingerprint, investigator)) => AuthAuditEvent::allowed(TOKEN_EVENT)
                .with_scheme(scheme.as_str())
                .with_investigator(investigator.name.clone())
                .with_fingerprints([fingerprint]),
            Err(err) => AuthAuditEvent::denied(TOKEN_EVENT, err),
        };
        self.audit.record(&event);
        result.map(|(_, _, investigator)| investigator)
    }

    /// Token verification without auditing.
    fn authenticate_inner(
        &self,
        header_name: &str,
        header_value: &str,
    ) -> Result<(SchemeId, Fingerprint, Investigator), AuthorityError> {
        let scheme_id = SchemeId::from_header_name(header_name).map_err(TokenError::from)?;
        let scheme = self.schemes.get(scheme_id).map_err(TokenError::from)?;
        let candidates = self.load_active_keys(scheme.as_ref())?;
        let verified = verify_signed_token(
            scheme.as_ref(),
            &candidates,
            header_value,
            self.clock.now(),
            self.token_window,
        )?;
        let investigator = self.investigators.resolve(&verified.fingerprint)?;
        Ok((scheme_id, verified.fingerprint, investigator))
    }

    /// Validates, verifies, authorizes, and stores a submitted action.
    ///
    /// Returns the stored action with its assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] describing the first failed check; the
    /// action is not stored.
    pub fn accept(&self, mut action: Action) -> Result<Action, AuthorityError> {
        let now = self.clock.now();
        match self.authorize(&action, now) {
            Ok((signers, investigators, permissions)) => {
                let id = ActionId::new(self.ids.next_id(now));
                action.id = Some(id);
                action.status = Some(ActionStatus::Pending);
                action.counters = ActionCounters::default();
                action.start_time = Some(now);
                action.last_update_time = Some(now);
                action.finish_time = None;
                if let Err(err) = self.store.put(&action) {
                    self.audit.record(
                        &AuthAuditEvent::denied(ACTION_EVENT, &err)
                            .with_action(action.name.clone()),
                    );
                    return Err(err);
                }
                let mut event = AuthAuditEvent::allowed(ACTION_EVENT)
                    .with_action(action.name.clone())
                    .with_action_id(id)
                    .with_fingerprints(&signers)
                    .with_permissions(permissions);
                for investigator in investigators {
                    event = event.with_investigator(investigator.name);
                }
                self.audit.record(&event);
                info!(
                    action_id = %id,
                    name = %action.name,
                    signers = signers.len(),
                    "action accepted"
                );
                Ok(action)
            }
            Err(err) => {
                self.audit.record(
                    &AuthAuditEvent::denied(ACTION_EVENT, &err).with_action(action.name.clone()),
                );
                Err(err)
            }
        }
    }

    /// Runs every acceptance check and returns the signers, their
    /// investigators, and the permissions applied.
    fn authorize(
        &self,
        action: &Action,
        now: OffsetDateTime,
    ) -> Result<(Vec<Fingerprint>, Vec<Investigator>, Vec<String>), AuthorityError> {
        action.validate(now)?;
        let payload = action.signing_payload()?;
        let mut keys: Vec<(Arc<dyn SignatureScheme>, Vec<Fingerprint>)> = Vec::new();
        for scheme in self.schemes.providers() {
            let candidates = self.load_active_keys(scheme.as_ref())?;
            keys.push((Arc::clone(scheme), candidates));
        }
        let mut signers = Vec::with_capacity(action.signatures.len());
        let mut investigators: Vec<Investigator> = Vec::new();
        for (index, encoded) in action.signatures.iter().enumerate() {
            let signature = STANDARD.decode(encoded).map_err(|err| AuthorityError::Signature {
                index,
                source: SchemeError::InvalidSignature(format!("signature is not base64: {err}")),
            })?;
            let fingerprint = verify_any_scheme(&keys, &signature, payload.as_bytes())
                .map_err(|source| AuthorityError::Signature {
                    index,
                    source,
                })?;
            debug!(index, fingerprint = %fingerprint, "action signature verified");
            let investigator = self.investigators.resolve(&fingerprint)?;
            if !investigators.iter().any(|known| known.id == investigator.id) {
                investigators.push(investigator);
            }
            signers.push(fingerprint);
        }
        let permissions = self.acl.verify_action(action, &signers)?;
        Ok((signers, investigators, permissions))
    }

    /// Imports the active investigator keys for `scheme` and returns their
    /// fingerprints.
    fn load_active_keys(
        &self,
        scheme: &dyn SignatureScheme,
    ) -> Result<Vec<Fingerprint>, AuthorityError> {
        let active = self.investigators.list_active_public_keys(scheme.identify())?;
        let mut fingerprints = Vec::with_capacity(active.len());
        for key in active {
            let fingerprint = scheme
                .import_public_key(&key.public_key)
                .map_err(RegistryError::from)?;
            fingerprints.push(fingerprint);
        }
        Ok(fingerprints)
    }

    /// Loads an accepted action.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::NotFound`] for unknown identifiers.
    pub fn get(&self, id: ActionId) -> Result<Action, AuthorityError> {
        self.store.get(id)
    }

    /// Records that commands were pushed to `count` agents.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] for unknown actions or counter overflow.
    pub fn record_commands_sent(&self, id: ActionId, count: u64) -> Result<Action, AuthorityError> {
        let now = self.clock.now();
        self.store.update(id, &mut |action| {
            action.counters.record_sent(count)?;
            action.status = Some(ActionStatus::Inflight);
            action.last_update_time = Some(now);
            Ok(())
        })
    }

    /// Records one command reaching a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError`] for unknown actions or invalid transitions.
    pub fn record_command_terminal(
        &self,
        id: ActionId,
        status: CommandStatus,
    ) -> Result<Action, AuthorityError> {
        let now = self.clock.now();
        self.store.update(id, &mut |action| {
            action.record_command_terminal(status, now)?;
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Tries every scheme's candidate keys and returns the first match, or the
/// last verification error.
fn verify_any_scheme(
    keys: &[(Arc<dyn SignatureScheme>, Vec<Fingerprint>)],
    signature: &[u8],
    message: &[u8],
) -> Result<Fingerprint, SchemeError> {
    let mut last_error = SchemeError::KeyNotFound("no active investigator keys".to_string());
    for (scheme, candidates) in keys {
        if candidates.is_empty() {
            continue;
        }
        match try_multiple_key_verification(scheme.as_ref(), candidates, signature, message) {
            Ok(fingerprint) => return Ok(fingerprint),
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}
