// crates/mig-core/src/action.rs
// ============================================================================
// Module: Actions
// Description: Action model, lifecycle validation, counters, and signing form.
// Purpose: Define the unit of fleet-wide work and the rules an authority
// applies before accepting it.
// Dependencies: mig-targeting, serde, serde_jcs, thiserror, time
// ============================================================================

//! ## Overview
//! An [`Action`] carries a target predicate, a list of [`Operation`]s, a
//! validity window, and the signatures investigators attached to it. The
//! authority validates the lifecycle window with [`Action::validate`], checks
//! signatures over [`Action::signing_payload`], then assigns an ID and zeroed
//! [`ActionCounters`].
//!
//! Invariants:
//! - `valid_from` strictly precedes `expire_after` for any accepted action.
//! - `sent >= done + in_flight + cancelled + failed + timed_out` for every
//!   counters value reachable through [`ActionCounters::record_sent`] and
//!   [`ActionCounters::record_terminal`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use mig_targeting::TargetExpr;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::command::CommandStatus;
use crate::identifiers::ActionId;
use crate::operation::Operation;
use crate::operation::OperationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Action syntax version understood by this crate.
pub const ACTION_SYNTAX_VERSION: u16 = 2;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Action lifecycle validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Action name is empty.
    #[error("action name is empty")]
    MissingName,
    /// Target predicate is empty.
    #[error("action target is empty")]
    MissingTarget,
    /// Syntax version is not [`ACTION_SYNTAX_VERSION`].
    #[error("unsupported action syntax version {found}, expected {ACTION_SYNTAX_VERSION}")]
    UnsupportedSyntaxVersion {
        /// Version carried by the action.
        found: u16,
    },
    /// `valid_from` does not precede `expire_after`.
    #[error("action is scheduled to expire before it becomes valid")]
    ScheduledBeforeValid,
    /// `expire_after` is already in the past.
    #[error("action expired at {expire_after}")]
    Expired {
        /// Expiration instant, RFC 3339.
        expire_after: String,
    },
    /// Operation list is empty.
    #[error("action has no operations")]
    MissingOperations,
    /// No signature is attached.
    #[error("action has no signatures")]
    MissingSignatures,
}

/// Counter bookkeeping failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountersError {
    /// A terminal status was recorded with no command in flight.
    #[error("no command in flight to record {0} against")]
    NothingInFlight(CommandStatus),
    /// `sent` is not a terminal status.
    #[error("sent is not a terminal command status")]
    NotTerminal,
    /// Counter arithmetic overflowed.
    #[error("action counters overflow")]
    Overflow,
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Authority-side action status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Accepted, waiting for the scheduler.
    Pending,
    /// Picked up by the scheduler.
    Scheduled,
    /// Matching agents are being enumerated.
    Preparing,
    /// Commands have been pushed to agents.
    Inflight,
    /// Every command reached a terminal status.
    Done,
    /// The action expired before completing.
    Expired,
    /// The scheduler rejected the action.
    Invalid,
    /// Any status this crate does not know.
    #[serde(other)]
    Unknown,
}

impl ActionStatus {
    /// Returns true while the authority is still working the action.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled | Self::Preparing | Self::Inflight)
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Preparing => "preparing",
            Self::Inflight => "inflight",
            Self::Done => "done",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Aggregate command counts for an action.
///
/// # Invariants
/// - `done` counts commands that finished with `success` or `expired`;
///   `success` and `expired` break it down further.
/// - `cancelled`, `failed`, and `timed_out` are disjoint from `done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounters {
    /// Commands pushed to agents.
    #[serde(default)]
    pub sent: u64,
    /// Commands that completed.
    #[serde(default)]
    pub done: u64,
    /// Commands awaiting an agent reply.
    #[serde(default, rename = "inflight")]
    pub in_flight: u64,
    /// Completed commands reporting success.
    #[serde(default)]
    pub success: u64,
    /// Commands cancelled.
    #[serde(default)]
    pub cancelled: u64,
    /// Completed commands that expired on the agent.
    #[serde(default)]
    pub expired: u64,
    /// Commands that failed.
    #[serde(default)]
    pub failed: u64,
    /// Commands that timed out.
    #[serde(default, rename = "timeout")]
    pub timed_out: u64,
}

impl ActionCounters {
    /// Records `count` newly sent commands.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError::Overflow`] on arithmetic overflow.
    pub fn record_sent(&mut self, count: u64) -> Result<(), CountersError> {
        self.sent = self.sent.checked_add(count).ok_or(CountersError::Overflow)?;
        self.in_flight = self.in_flight.checked_add(count).ok_or(CountersError::Overflow)?;
        Ok(())
    }

    /// Moves one in-flight command into the bucket for `status`.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError`] when nothing is in flight or `status` is not
    /// terminal.
    pub fn record_terminal(&mut self, status: CommandStatus) -> Result<(), CountersError> {
        if !status.is_terminal() {
            return Err(CountersError::NotTerminal);
        }
        if self.in_flight == 0 {
            return Err(CountersError::NothingInFlight(status));
        }
        self.in_flight -= 1;
        match status {
            CommandStatus::Success => {
                self.done += 1;
                self.success += 1;
            }
            CommandStatus::Expired => {
                self.done += 1;
                self.expired += 1;
            }
            CommandStatus::Cancelled => self.cancelled += 1,
            CommandStatus::Failed => self.failed += 1,
            CommandStatus::Timeout => self.timed_out += 1,
            CommandStatus::Sent => return Err(CountersError::NotTerminal),
        }
        Ok(())
    }

    /// Returns true when the accounting invariant holds.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        let accounted = self
            .done
            .saturating_add(self.in_flight)
            .saturating_add(self.cancelled)
            .saturating_add(self.failed)
            .saturating_add(self.timed_out);
        self.sent >= accounted
    }

    /// Returns true once at least one command completed and every sent
    /// command is done.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.done > 0 && self.done >= self.sent
    }

    /// Returns `done / sent` as a percentage, or zero when nothing was sent.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Counters are display-only percentages.")]
    pub fn completion_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        (self.done as f64 / self.sent as f64) * 100.0
    }
}

impl fmt::Display for ActionCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sent, {} done", self.sent, self.done)?;
        let extras = [
            (self.in_flight, "inflight"),
            (self.success, "succeeded"),
            (self.cancelled, "cancelled"),
            (self.expired, "expired"),
            (self.failed, "failed"),
            (self.timed_out, "timed out"),
        ];
        for (count, label) in extras {
            if count > 0 {
                write!(f, ", {count} {label}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Authoring metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Author name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    /// Author email.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Reference URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Revision number.
    #[serde(default)]
    pub revision: u64,
}

/// Threat classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threat {
    /// External reference.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#ref: String,
    /// Severity level.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub level: String,
    /// Threat family.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub family: String,
    /// Threat type.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

// ============================================================================
// SECTION: Action
// ============================================================================

/// Signed unit of fleet-wide work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Authority-assigned identifier; absent before acceptance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ActionId>,
    /// Human-readable name.
    pub name: String,
    /// Rendered target predicate.
    pub target: String,
    /// Authoring metadata.
    #[serde(default)]
    pub description: Description,
    /// Threat classification.
    #[serde(default)]
    pub threat: Threat,
    /// Start of the validity window.
    #[serde(rename = "validfrom", with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    /// End of the validity window.
    #[serde(rename = "expireafter", with = "time::serde::rfc3339")]
    pub expire_after: OffsetDateTime,
    /// Module invocations.
    pub operations: Vec<Operation>,
    /// Base64 detached signatures over [`Action::signing_payload`].
    #[serde(default)]
    pub signatures: Vec<String>,
    /// Authority-side status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionStatus>,
    /// When the authority accepted the action.
    #[serde(
        default,
        rename = "starttime",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<OffsetDateTime>,
    /// When the action finished.
    #[serde(
        default,
        rename = "finishtime",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_time: Option<OffsetDateTime>,
    /// Last authority-side update.
    #[serde(
        default,
        rename = "lastupdatetime",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_update_time: Option<OffsetDateTime>,
    /// Command counters.
    #[serde(default)]
    pub counters: ActionCounters,
    /// Syntax version.
    #[serde(rename = "syntaxversion")]
    pub syntax_version: u16,
}

impl Action {
    /// Builds an unsigned action shell.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: &TargetExpr,
        operations: Vec<Operation>,
        valid_from: OffsetDateTime,
        expire_after: OffsetDateTime,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            target: target.to_sql(),
            description: Description::default(),
            threat: Threat::default(),
            valid_from,
            expire_after,
            operations,
            signatures: Vec::new(),
            status: None,
            start_time: None,
            finish_time: None,
            last_update_time: None,
            counters: ActionCounters::default(),
            syntax_version: ACTION_SYNTAX_VERSION,
        }
    }

    /// Checks the fields and validity window an authority requires.
    ///
    /// # Errors
    ///
    /// Returns the first [`LifecycleError`] found.
    pub fn validate(&self, now: OffsetDateTime) -> Result<(), LifecycleError> {
        if self.name.trim().is_empty() {
            return Err(LifecycleError::MissingName);
        }
        if self.target.trim().is_empty() {
            return Err(LifecycleError::MissingTarget);
        }
        if self.syntax_version != ACTION_SYNTAX_VERSION {
            return Err(LifecycleError::UnsupportedSyntaxVersion {
                found: self.syntax_version,
            });
        }
        if self.valid_from >= self.expire_after {
            return Err(LifecycleError::ScheduledBeforeValid);
        }
        if now > self.expire_after {
            return Err(LifecycleError::Expired {
                expire_after: format_instant(self.expire_after),
            });
        }
        if self.operations.is_empty() {
            return Err(LifecycleError::MissingOperations);
        }
        if self.signatures.is_empty() {
            return Err(LifecycleError::MissingSignatures);
        }
        Ok(())
    }

    /// Returns the canonical text investigators sign.
    ///
    /// Format: `name=<n>;target=<t>;validfrom=<unix>;expireafter=<unix>;operations=<json>;`
    /// where `<json>` is the RFC 8785 canonical form of the operation list.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Json`] when operations cannot be canonicalized.
    pub fn signing_payload(&self) -> Result<String, OperationError> {
        let operations = serde_jcs::to_string(&self.operations)
            .map_err(|err| OperationError::Json(err.to_string()))?;
        Ok(format!(
            "name={};target={};validfrom={};expireafter={};operations={};",
            self.name,
            self.target,
            self.valid_from.unix_timestamp(),
            self.expire_after.unix_timestamp(),
            operations
        ))
    }

    /// Compresses every operation flagged `want_compressed`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] from the first operation that fails.
    pub fn compress_operations(&mut self) -> Result<(), OperationError> {
        for operation in self.operations.iter_mut().filter(|op| op.want_compressed) {
            operation.compress()?;
        }
        Ok(())
    }

    /// Decompresses every compressed operation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] from the first operation that fails.
    pub fn decompress_operations(&mut self) -> Result<(), OperationError> {
        for operation in &mut self.operations {
            operation.decompress()?;
        }
        Ok(())
    }

    /// Returns true while the authority-side status is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_some_and(ActionStatus::is_active)
    }

    /// Applies a command completion to the counters and closes the action
    /// once nothing remains in flight.
    ///
    /// # Errors
    ///
    /// Returns [`CountersError`] when the transition is not allowed.
    pub fn record_command_terminal(
        &mut self,
        status: CommandStatus,
        at: OffsetDateTime,
    ) -> Result<(), CountersError> {
        self.counters.record_terminal(status)?;
        self.last_update_time = Some(at);
        if self.counters.in_flight == 0 {
            self.status = Some(ActionStatus::Done);
            self.finish_time = Some(at);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Formats an instant as RFC 3339, falling back to the unix timestamp.
#[must_use]
pub fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| instant.unix_timestamp().to_string())
}
