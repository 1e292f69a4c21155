// crates/mig-core/src/command.rs
// ============================================================================
// Module: Commands
// Description: Per-agent execution records and module results.
// Purpose: Track one action on one agent through a single terminal transition.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! A [`Command`] references its action by ID and records the agent it ran on,
//! the terminal status the agent reported, and one [`ModuleResult`] per
//! operation. The status starts at `sent` and moves to a terminal value
//! exactly once through [`Command::complete`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::identifiers::ActionId;
use crate::identifiers::AgentId;
use crate::identifiers::CommandId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Command status reported by agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Delivered to the agent, awaiting a reply.
    Sent,
    /// All operations ran.
    Success,
    /// The agent reported a failure.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Expired before the agent ran it.
    Expired,
    /// The agent did not answer in time.
    Timeout,
}

impl CommandStatus {
    /// Returns true for every status except `sent`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Sent)
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Command transition errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command already holds a terminal status.
    #[error("command {id} is already terminal with status {status}")]
    AlreadyTerminal {
        /// Command identifier.
        id: CommandId,
        /// Existing terminal status.
        status: CommandStatus,
    },
    /// The requested status is not terminal.
    #[error("cannot complete a command with non-terminal status {0}")]
    NotTerminal(CommandStatus),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Output of one module run on one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
    /// The module found what it was looking for.
    #[serde(default, rename = "foundanything")]
    pub found_anything: bool,
    /// The module ran without fatal error.
    #[serde(default)]
    pub success: bool,
    /// Module-specific findings.
    #[serde(default)]
    pub elements: Value,
    /// Module-specific run statistics.
    #[serde(default)]
    pub statistics: Value,
    /// Soft errors encountered during the run.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Agent identity as recorded on a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAgent {
    /// Agent identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AgentId>,
    /// Agent name.
    pub name: String,
    /// Agent queue location.
    #[serde(rename = "queueloc")]
    pub queue_location: String,
}

/// Execution of one action on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command identifier.
    pub id: CommandId,
    /// Action this command executes.
    #[serde(rename = "actionid")]
    pub action_id: ActionId,
    /// Agent the command ran on.
    pub agent: CommandAgent,
    /// Current status.
    pub status: CommandStatus,
    /// One result per action operation.
    #[serde(default)]
    pub results: Vec<ModuleResult>,
    /// When the command was sent.
    #[serde(rename = "starttime", with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// When the command reached its terminal status.
    #[serde(
        default,
        rename = "finishtime",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_time: Option<OffsetDateTime>,
}

impl Command {
    /// Creates a command in the `sent` status.
    #[must_use]
    pub const fn sent(
        id: CommandId,
        action_id: ActionId,
        agent: CommandAgent,
        start_time: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            action_id,
            agent,
            status: CommandStatus::Sent,
            results: Vec::new(),
            start_time,
            finish_time: None,
        }
    }

    /// Sets the terminal status and results.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::AlreadyTerminal`] if a terminal status was
    /// already set, or [`CommandError::NotTerminal`] for `sent`.
    pub fn complete(
        &mut self,
        status: CommandStatus,
        results: Vec<ModuleResult>,
        at: OffsetDateTime,
    ) -> Result<(), CommandError> {
        if self.status.is_terminal() {
            return Err(CommandError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        if !status.is_terminal() {
            return Err(CommandError::NotTerminal(status));
        }
        self.status = status;
        self.results = results;
        self.finish_time = Some(at);
        Ok(())
    }

    /// Returns true when any module result found something.
    #[must_use]
    pub fn found_anything(&self) -> bool {
        self.results.iter().any(|result| result.found_anything)
    }
}
