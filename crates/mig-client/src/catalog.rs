// crates/mig-client/src/catalog.rs
// ============================================================================
// Module: Action Catalog
// Description: Client-local registry of actions awaiting or past dispatch.
// Purpose: Assemble, sign, and track actions under locally generated IDs.
// Dependencies: mig-core, mig-targeting, rand, tracing
// ============================================================================

//! ## Overview
//! The [`ActionCatalog`] keys actions by a [`LocalActionId`]: three random
//! bytes rendered as six hex characters, checked against the live map before
//! use. `create` compiles target queries into one predicate and builds an
//! unsigned action with a single operation. Signatures are appended with
//! `add_signature`, or with `add_signature_over` when the caller signed a
//! payload built earlier; `mark_dispatched` records the authority-assigned ID.
//!
//! Invariants:
//! - Mutators are serialized by one write lock; lookups never observe a
//!   partially applied mutation.
//! - A local ID is never issued twice by the same catalog.
//! - A signature stored through `add_signature_over` covers the action's
//!   payload at the moment it is stored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Duration as StdDuration;

use mig_core::Action;
use mig_core::ActionId;
use mig_core::Clock;
use mig_core::LocalActionId;
use mig_core::Module;
use mig_targeting::Query;
use mig_targeting::TargetExpr;
use mig_targeting::compile_all;
use rand::RngCore;
use rand::rngs::OsRng;
use time::Duration;
use tracing::debug;
use tracing::warn;

use crate::CatalogError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Random bytes per local action identifier.
pub const LOCAL_ID_BYTES: usize = 3;

/// Wait after the entropy source fails before trying again.
pub const DEFAULT_ENTROPY_BACKOFF: StdDuration = StdDuration::from_millis(250);

/// Identifier draws attempted before `create` gives up.
const MAX_ID_ATTEMPTS: usize = 64;

// ============================================================================
// SECTION: Entropy
// ============================================================================

/// Random byte source for local identifiers.
pub trait EntropySource: Send + Sync {
    /// Fills `buf` with random bytes.
    ///
    /// # Errors
    ///
    /// Returns a description when the source is temporarily exhausted.
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// Operating system random number generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        OsRng.try_fill_bytes(buf).map_err(|err| err.to_string())
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Client-side status of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    /// Assembled locally, not yet submitted.
    PendingDispatch,
    /// Accepted by the authority.
    Dispatched,
    /// Abandoned locally; authority-side state is untouched.
    CancelledByClient,
}

impl RecordStatus {
    /// Returns the status label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingDispatch => "pending-dispatch",
            Self::Dispatched => "dispatched",
            Self::CancelledByClient => "cancelled-by-client",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Action as assembled and signed locally.
    pub action: Action,
    /// Compiled target, kept for local evaluation.
    pub target: TargetExpr,
    /// Client-side status.
    pub status: RecordStatus,
    /// Identifier assigned by the authority once dispatched.
    pub authority_id: Option<ActionId>,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Concurrent registry of locally assembled actions.
pub struct ActionCatalog {
    /// Entries keyed by local identifier.
    records: RwLock<HashMap<LocalActionId, ActionRecord>>,
    /// Random source for identifiers.
    entropy: Arc<dyn EntropySource>,
    /// Time source for validity windows.
    clock: Arc<dyn Clock>,
    /// Wait after an entropy failure.
    backoff: StdDuration,
}

impl fmt::Debug for ActionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCatalog").field("backoff", &self.backoff).finish_non_exhaustive()
    }
}

impl ActionCatalog {
    /// Creates an empty catalog using operating system entropy.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_entropy(clock, Arc::new(OsEntropy))
    }

    /// Creates an empty catalog with an explicit entropy source.
    #[must_use]
    pub fn with_entropy(clock: Arc<dyn Clock>, entropy: Arc<dyn EntropySource>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            entropy,
            clock,
            backoff: DEFAULT_ENTROPY_BACKOFF,
        }
    }

    /// Overrides the wait applied after an entropy failure.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: StdDuration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Assembles an unsigned action and stores it under a new local ID.
    ///
    /// The action is named after its local ID, valid from now, and expires
    /// `expire_after` from now.
    ///
    /// Blocks the calling thread for the configured backoff after each
    /// entropy failure; async callers should run it off the executor (for
    /// example with `tokio::task::block_in_place`).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the target is empty or fails to compile,
    /// the module parameters are invalid, or no identifier can be drawn.
    pub fn create(
        &self,
        module: &dyn Module,
        queries: &[Query],
        expire_after: Duration,
    ) -> Result<LocalActionId, CatalogError> {
        if queries.is_empty() {
            return Err(CatalogError::MissingTarget);
        }
        if !expire_after.is_positive() {
            return Err(CatalogError::InvalidExpiry);
        }
        let target = compile_all(queries)?;
        let operation = module.to_operation()?;
        let now = self.clock.now();
        let expires = now.checked_add(expire_after).ok_or(CatalogError::InvalidExpiry)?;

        for _ in 0 .. MAX_ID_ATTEMPTS {
            let candidate = match self.draw_id() {
                Ok(candidate) => candidate,
                Err(reason) => {
                    warn!(%reason, "entropy source unavailable, backing off");
                    std::thread::sleep(self.backoff);
                    continue;
                }
            };
            let mut records = self.write()?;
            if records.contains_key(&candidate) {
                debug!(id = %candidate, "local action id collision");
                continue;
            }
            let action =
                Action::new(candidate.as_str(), &target, vec![operation.clone()], now, expires);
            records.insert(
                candidate.clone(),
                ActionRecord {
                    action,
                    target: target.clone(),
                    status: RecordStatus::PendingDispatch,
                    authority_id: None,
                },
            );
            debug!(id = %candidate, module = module.name(), "action created");
            return Ok(candidate);
        }
        Err(CatalogError::IdExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Returns a copy of the entry, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for unknown identifiers.
    pub fn get(&self, id: &LocalActionId) -> Result<ActionRecord, CatalogError> {
        self.read()?.get(id).cloned().ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    /// Returns a copy of the entry, or `None` when it is absent or the
    /// catalog is unreadable.
    #[must_use]
    pub fn lookup(&self, id: &LocalActionId) -> Option<ActionRecord> {
        self.get(id).ok()
    }

    /// Appends a base64 signature to the entry's action.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for unknown identifiers.
    pub fn add_signature(
        &self,
        id: &LocalActionId,
        signature: impl Into<String>,
    ) -> Result<(), CatalogError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        record.action.signatures.push(signature.into());
        Ok(())
    }

    /// Appends a base64 signature made over `signed_payload`, provided the
    /// pending entry still produces exactly that payload.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::SignedContentChanged`] when the entry was
    /// modified after the payload was built, or another [`CatalogError`] for
    /// unknown or already dispatched entries.
    pub fn add_signature_over(
        &self,
        id: &LocalActionId,
        signed_payload: &str,
        signature: impl Into<String>,
    ) -> Result<(), CatalogError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        ensure_pending(id, record)?;
        if record.action.signing_payload()? != signed_payload {
            warn!(id = %id, "action changed while being signed; signature discarded");
            return Err(CatalogError::SignedContentChanged(id.clone()));
        }
        record.action.signatures.push(signature.into());
        Ok(())
    }

    /// Flags every operation of a pending entry for compression before
    /// signing.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for unknown, signed, or already dispatched
    /// entries.
    pub fn request_compression(&self, id: &LocalActionId) -> Result<(), CatalogError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        ensure_pending(id, record)?;
        if !record.action.signatures.is_empty() {
            return Err(CatalogError::AlreadySigned(id.clone()));
        }
        for operation in &mut record.action.operations {
            operation.want_compressed = true;
        }
        Ok(())
    }

    /// Compresses operations flagged for compression and returns the
    /// resulting action, ready to be signed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for unknown or already dispatched entries or
    /// when compression fails.
    pub fn prepare_for_signing(&self, id: &LocalActionId) -> Result<Action, CatalogError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        ensure_pending(id, record)?;
        let mut action = record.action.clone();
        action.compress_operations()?;
        record.action = action.clone();
        Ok(action)
    }

    /// Records the identifier the authority assigned on dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for unknown entries or entries that are not
    /// pending dispatch.
    pub fn mark_dispatched(
        &self,
        id: &LocalActionId,
        authority_id: ActionId,
    ) -> Result<(), CatalogError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        ensure_pending(id, record)?;
        record.status = RecordStatus::Dispatched;
        record.authority_id = Some(authority_id);
        Ok(())
    }

    /// Marks the entry abandoned by the client.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for unknown identifiers.
    pub fn mark_cancelled(&self, id: &LocalActionId) -> Result<(), CatalogError> {
        let mut records = self.write()?;
        let record = records.get_mut(id).ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        record.status = RecordStatus::CancelledByClient;
        Ok(())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map_or(0, |records| records.len())
    }

    /// Returns true when the catalog holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draws a candidate identifier from the entropy source.
    fn draw_id(&self) -> Result<LocalActionId, String> {
        let mut bytes = [0u8; LOCAL_ID_BYTES];
        self.entropy.fill(&mut bytes)?;
        let mut id = String::with_capacity(LOCAL_ID_BYTES * 2);
        for byte in bytes {
            let _ = write!(id, "{byte:02x}");
        }
        Ok(LocalActionId::new(id))
    }

    /// Acquires the read lock.
    fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<LocalActionId, ActionRecord>>, CatalogError> {
        self.records.read().map_err(|_| CatalogError::Poisoned)
    }

    /// Acquires the write lock.
    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<LocalActionId, ActionRecord>>, CatalogError> {
        self.records.write().map_err(|_| CatalogError::Poisoned)
    }
}

/// Fails unless the record is still pending dispatch.
fn ensure_pending(id: &LocalActionId, record: &ActionRecord) -> Result<(), CatalogError> {
    if record.status == RecordStatus::PendingDispatch {
        return Ok(());
    }
    Err(CatalogError::NotPending {
        id: id.clone(),
        status: record.status.to_string(),
    })
}
