// crates/mig-client/src/orchestrator.rs
// ============================================================================
// Module: Dispatch Orchestrator
// Description: Sign, dispatch, follow, and collect results of actions.
// Purpose: Drive an action from local assembly to aggregated results.
// Dependencies: mig-auth, mig-config, mig-core, tokio, tracing
// ============================================================================

//! ## Overview
//! The [`Orchestrator`] ties the [`ActionCatalog`] to a [`MigApi`]:
//! - `sign` compresses flagged operations and appends a detached signature
//!   over the action's canonical form.
//! - `dispatch` submits a catalog entry and records the authority's ID.
//! - `follow` polls the action until it completes, leaves the active status
//!   set, or passes its expiry plus a grace period. Fetch failures are retried
//!   a bounded number of times and each retry is logged.
//! - `search` pages through command results until an empty page or the
//!   "no results found" signal.
//!
//! Cancelling a follow only stops local observation; the dispatched action is
//! left untouched and one final fetch is still attempted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mig_auth::SignatureScheme;
use mig_config::FollowConfig;
use mig_config::SearchConfig;
use mig_core::Action;
use mig_core::ActionCounters;
use mig_core::ActionId;
use mig_core::ActionStatus;
use mig_core::Clock;
use mig_core::Command;
use mig_core::Fingerprint;
use mig_core::LocalActionId;
use mig_core::Module;
use mig_targeting::Query;
use time::Duration;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::ActionCatalog;
use crate::Authenticator;
use crate::CatalogError;
use crate::ClientError;
use crate::CommandSearch;
use crate::MigApi;
use crate::catalog::RecordStatus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Completion percentage at and above which progress is no longer reported.
pub const PROGRESS_REPORT_CEILING: f64 = 99.5;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cancellation signal observed by `follow` at every poll boundary.
#[derive(Debug, Clone)]
pub struct FollowCancel {
    /// Receiver flipped to `true` on cancellation.
    receiver: watch::Receiver<bool>,
}

impl FollowCancel {
    /// Creates a signal and the sender that triggers it.
    #[must_use]
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self {
            receiver,
        })
    }

    /// Creates a signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_, signal) = Self::channel();
        signal
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits for `duration`, returning early with `true` on cancellation.
    pub(crate) async fn pause(&mut self, duration: StdDuration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return false,
                changed = self.receiver.changed() => {
                    if changed.is_err() {
                        (&mut sleep).await;
                        return false;
                    }
                    if self.is_cancelled() {
                        return true;
                    }
                }
            }
        }
    }
}

impl Default for FollowCancel {
    fn default() -> Self {
        Self::never()
    }
}

// ============================================================================
// SECTION: Follow Types
// ============================================================================

/// Observation emitted while following an action.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowEvent {
    /// The authority-side status changed.
    StatusChanged(ActionStatus),
    /// Completion advanced while still below [`PROGRESS_REPORT_CEILING`].
    Progress {
        /// `done / sent` as a percentage.
        percent: f64,
        /// Counters at the time of the report.
        counters: ActionCounters,
    },
}

/// Why a follow loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEnd {
    /// Every sent command is done.
    Completed,
    /// The status left the active set.
    Inactive(ActionStatus),
    /// The action passed its expiry plus the grace period.
    Expired,
    /// The caller cancelled observation.
    Cancelled,
}

impl fmt::Display for FollowEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Inactive(status) => write!(f, "status {status}"),
            Self::Expired => f.write_str("expired"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of following an action.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowOutcome {
    /// Last copy of the action fetched.
    pub action: Action,
    /// Why following stopped.
    pub end: FollowEnd,
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Client-side driver for the action lifecycle.
pub struct Orchestrator {
    /// Remote API.
    api: Arc<dyn MigApi>,
    /// Local action catalog.
    catalog: Arc<ActionCatalog>,
    /// Time source for expiry checks.
    clock: Arc<dyn Clock>,
    /// Follow loop tuning.
    follow: FollowConfig,
    /// Result search tuning.
    search: SearchConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with default follow and search settings.
    #[must_use]
    pub fn new(api: Arc<dyn MigApi>, catalog: Arc<ActionCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            catalog,
            clock,
            follow: FollowConfig::default(),
            search: SearchConfig::default(),
        }
    }

    /// Overrides follow loop tuning.
    #[must_use]
    pub fn with_follow_config(mut self, follow: FollowConfig) -> Self {
        self.follow = follow;
        self
    }

    /// Overrides result search tuning.
    #[must_use]
    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Returns the local catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ActionCatalog> {
        &self.catalog
    }

    /// Assembles an action in the catalog.
    ///
    /// Like [`ActionCatalog::create`], this blocks the calling thread while
    /// backing off from entropy failures.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Catalog`] when assembly fails.
    pub fn create(
        &self,
        module: &dyn Module,
        queries: &[Query],
        expire_after: Duration,
    ) -> Result<LocalActionId, ClientError> {
        Ok(self.catalog.create(module, queries, expire_after)?)
    }

    /// Signs a catalog entry with the key identified by `fingerprint`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the entry is unknown or already
    /// dispatched, when canonicalization or signing fails, or when the entry
    /// changed while the signature was being made.
    pub fn sign(
        &self,
        id: &LocalActionId,
        scheme: &dyn SignatureScheme,
        fingerprint: &Fingerprint,
    ) -> Result<(), ClientError> {
        let action = self.catalog.prepare_for_signing(id)?;
        let payload = action.signing_payload()?;
        let signature = scheme.sign(fingerprint, payload.as_bytes())?;
        self.catalog.add_signature_over(id, &payload, STANDARD.encode(signature))?;
        debug!(id = %id, fingerprint = %fingerprint, "action signed");
        Ok(())
    }

    /// Submits a catalog entry and records the authority-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DispatchRejected`] when the authority refuses
    /// the action, or another [`ClientError`] for local or transport failures.
    pub async fn dispatch(
        &self,
        id: &LocalActionId,
        auth: &dyn Authenticator,
    ) -> Result<Action, ClientError> {
        let record = self.catalog.get(id)?;
        if record.status != RecordStatus::PendingDispatch {
            return Err(CatalogError::NotPending {
                id: id.clone(),
                status: record.status.to_string(),
            }
            .into());
        }
        let accepted = self.api.post_action(&record.action, auth).await?;
        let authority_id = accepted
            .id
            .ok_or_else(|| ClientError::Protocol("accepted action has no id".to_string()))?;
        self.catalog.mark_dispatched(id, authority_id)?;
        info!(id = %id, action_id = %authority_id, "action dispatched");
        Ok(accepted)
    }

    /// Polls an action until it completes, goes inactive, expires, or the
    /// caller cancels.
    ///
    /// `observe` receives status changes and progress reports. After the loop
    /// stops, one final fetch refreshes the returned action on a best-effort
    /// basis.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::FollowFailed`] after the configured number of
    /// consecutive fetch failures, or the first non-retryable error.
    pub async fn follow<F>(
        &self,
        action_id: ActionId,
        auth: &dyn Authenticator,
        mut cancel: FollowCancel,
        mut observe: F,
    ) -> Result<FollowOutcome, ClientError>
    where
        F: FnMut(FollowEvent) + Send,
    {
        let grace = Duration::try_from(self.follow.expiry_grace())
            .map_err(|err| ClientError::Internal(format!("expiry grace out of range: {err}")))?;
        let mut failures: u32 = 0;
        let mut latest: Option<Action> = None;
        let mut reported_done: Option<u64> = None;

        let end = loop {
            if cancel.is_cancelled() {
                break FollowEnd::Cancelled;
            }
            let fetched = match self.api.get_action(action_id, auth).await {
                Ok(fetched) => fetched,
                Err(err) if err.is_retryable() => {
                    failures = failures.saturating_add(1);
                    warn!(
                        action_id = %action_id,
                        attempt = failures,
                        max_attempts = self.follow.max_fetch_retries,
                        error = %err,
                        "failed to fetch action"
                    );
                    if failures >= self.follow.max_fetch_retries {
                        return Err(ClientError::FollowFailed {
                            attempts: failures,
                            last_error: err.to_string(),
                        });
                    }
                    if cancel.pause(self.follow.retry_interval()).await {
                        break FollowEnd::Cancelled;
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            failures = 0;

            let previous_status = latest.as_ref().and_then(|action| action.status);
            if let Some(status) = fetched.status
                && previous_status != Some(status)
            {
                debug!(action_id = %action_id, status = %status, "action status changed");
                observe(FollowEvent::StatusChanged(status));
            }
            let counters = fetched.counters;
            let percent = counters.completion_percent();
            if counters.sent > 0
                && percent < PROGRESS_REPORT_CEILING
                && reported_done != Some(counters.done)
            {
                reported_done = Some(counters.done);
                observe(FollowEvent::Progress {
                    percent,
                    counters,
                });
            }

            let deadline = fetched.expire_after.checked_add(grace).unwrap_or(fetched.expire_after);
            let stop = if !fetched.is_active() {
                Some(FollowEnd::Inactive(fetched.status.unwrap_or(ActionStatus::Unknown)))
            } else if counters.is_complete() {
                Some(FollowEnd::Completed)
            } else if self.clock.now() > deadline {
                Some(FollowEnd::Expired)
            } else {
                None
            };
            latest = Some(fetched);
            if let Some(stop) = stop {
                break stop;
            }
            if cancel.pause(self.follow.poll_interval()).await {
                break FollowEnd::Cancelled;
            }
        };

        let action = match self.api.get_action(action_id, auth).await {
            Ok(action) => action,
            Err(err) => {
                warn!(action_id = %action_id, error = %err, "final action fetch failed");
                latest.ok_or(err)?
            }
        };
        info!(
            action_id = %action_id,
            end = %end,
            counters = %action.counters,
            "stopped following action"
        );
        Ok(FollowOutcome {
            action,
            end,
        })
    }

    /// Collects every command of an action.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when a page fails for any reason other than
    /// the end-of-results signal.
    pub async fn results(
        &self,
        action_id: ActionId,
        auth: &dyn Authenticator,
    ) -> Result<Vec<Command>, ClientError> {
        self.search(CommandSearch::for_action(action_id, self.search.page_size), auth).await
    }

    /// Pages through a command search, starting at `search`.
    ///
    /// Stops on an empty page or the "no results found" signal and returns
    /// everything accumulated so far.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when a page fails for any other reason.
    pub async fn search(
        &self,
        search: CommandSearch,
        auth: &dyn Authenticator,
    ) -> Result<Vec<Command>, ClientError> {
        let mut page = search;
        let mut commands = Vec::new();
        loop {
            match self.api.search_commands(&page, auth).await {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => {
                    debug!(
                        action_id = %page.action_id,
                        offset = page.offset,
                        count = batch.len(),
                        "fetched result page"
                    );
                    commands.extend(batch);
                    page = page.next_page();
                }
                Err(ClientError::NoResults) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(commands)
    }
}
