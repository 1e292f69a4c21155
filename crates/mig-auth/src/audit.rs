// crates/mig-auth/src/audit.rs
// ============================================================================
// Module: Authority Audit
// Description: Structured audit events for authority decisions.
// Purpose: Record every token and action acceptance decision.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Every allow and deny decision made by the authority produces an
//! [`AuthAuditEvent`] that is handed to an [`AuditSink`]. The default sink
//! emits the event as one JSON document through `tracing`.
//!
//! Security posture: events carry fingerprints and reasons, never token text,
//! signatures, or key material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use mig_core::ActionId;
use mig_core::Fingerprint;
use serde::Serialize;
use tracing::info;

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Event name for token verification decisions.
pub const TOKEN_EVENT: &str = "auth_token";

/// Event name for action acceptance decisions.
pub const ACTION_EVENT: &str = "action_acceptance";

/// Authority audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Decision outcome.
    decision: &'static str,
    /// Scheme involved, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<String>,
    /// Investigator names resolved from signers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    investigators: Vec<String>,
    /// Signer fingerprints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fingerprints: Vec<String>,
    /// Permissions applied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    permissions: Vec<String>,
    /// Action name, if the decision concerns an action.
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    /// Assigned action identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    action_id: Option<u64>,
    /// Failure reason (for deny events).
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl AuthAuditEvent {
    /// Builds an allow event.
    #[must_use]
    pub const fn allowed(event: &'static str) -> Self {
        Self::new(event, "allow", None)
    }

    /// Builds a deny event with the failure reason.
    #[must_use]
    pub fn denied(event: &'static str, reason: impl ToString) -> Self {
        Self::new(event, "deny", Some(reason.to_string()))
    }

    /// Shared constructor.
    const fn new(event: &'static str, decision: &'static str, reason: Option<String>) -> Self {
        Self {
            event,
            decision,
            scheme: None,
            investigators: Vec::new(),
            fingerprints: Vec::new(),
            permissions: Vec::new(),
            action: None,
            action_id: None,
            reason,
        }
    }

    /// Sets the scheme label.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Adds an investigator name.
    #[must_use]
    pub fn with_investigator(mut self, name: impl Into<String>) -> Self {
        self.investigators.push(name.into());
        self
    }

    /// Adds signer fingerprints.
    #[must_use]
    pub fn with_fingerprints<'a, I>(mut self, fingerprints: I) -> Self
    where
        I: IntoIterator<Item = &'a Fingerprint>,
    {
        self.fingerprints.extend(fingerprints.into_iter().map(ToString::to_string));
        self
    }

    /// Sets the permissions applied.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Sets the action name.
    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        self.action = Some(name.into());
        self
    }

    /// Sets the assigned action identifier.
    #[must_use]
    pub fn with_action_id(mut self, id: ActionId) -> Self {
        self.action_id = Some(id.get());
        self
    }

    /// Event identifier.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        self.event
    }

    /// Decision outcome (`allow` or `deny`).
    #[must_use]
    pub const fn decision(&self) -> &'static str {
        self.decision
    }

    /// Failure reason, for deny events.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Investigator names.
    #[must_use]
    pub fn investigators(&self) -> &[String] {
        &self.investigators
    }

    /// Permissions applied.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for authority decisions.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &AuthAuditEvent);
}

/// Audit sink that emits JSON events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            info!(
                target: "mig::audit",
                event = event.event,
                decision = event.decision,
                "{payload}"
            );
        }
    }
}

/// No-op audit sink for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuthAuditEvent) {}
}

/// Audit sink that keeps events in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    /// Recorded events.
    events: Mutex<Vec<AuthAuditEvent>>,
}

impl RecordingAuditSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuthAuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
