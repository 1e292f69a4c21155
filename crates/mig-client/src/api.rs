// crates/mig-client/src/api.rs
// ============================================================================
// Module: API Interface
// Description: Transport-neutral view of the MIG API.
// Purpose: Let the orchestrator run against HTTP or an in-process fake.
// Dependencies: async-trait, mig-auth, mig-core, time
// ============================================================================

//! ## Overview
//! [`MigApi`] lists the remote calls the orchestrator needs: submit an
//! action, fetch actions/commands/investigators by identifier, and page
//! through command search results. Every call receives the
//! [`Authenticator`] so a fresh token is attached to each request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use mig_auth::Investigator;
use mig_core::Action;
use mig_core::ActionId;
use mig_core::Command;
use mig_core::CommandId;
use mig_core::CommandStatus;
use mig_core::InvestigatorId;
use time::OffsetDateTime;

use crate::Authenticator;
use crate::ClientError;

// ============================================================================
// SECTION: Search Parameters
// ============================================================================

/// Command search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSearch {
    /// Action whose commands are returned.
    pub action_id: ActionId,
    /// Page size.
    pub limit: u32,
    /// Offset of the first result.
    pub offset: u64,
    /// Restrict to commands whose results found something.
    pub found_anything: Option<bool>,
    /// Restrict to one command status.
    pub status: Option<CommandStatus>,
    /// Restrict to commands started after this instant.
    pub after: Option<OffsetDateTime>,
    /// Restrict to commands started before this instant.
    pub before: Option<OffsetDateTime>,
}

impl CommandSearch {
    /// Builds an unfiltered search for an action's commands.
    #[must_use]
    pub const fn for_action(action_id: ActionId, limit: u32) -> Self {
        Self {
            action_id,
            limit,
            offset: 0,
            found_anything: None,
            status: None,
            after: None,
            before: None,
        }
    }

    /// Restricts results by `foundanything`.
    #[must_use]
    pub const fn with_found_anything(mut self, found_anything: bool) -> Self {
        self.found_anything = Some(found_anything);
        self
    }

    /// Restricts results to a date range.
    #[must_use]
    pub const fn with_range(
        mut self,
        after: Option<OffsetDateTime>,
        before: Option<OffsetDateTime>,
    ) -> Self {
        self.after = after;
        self.before = before;
        self
    }

    /// Returns the search for the following page.
    #[must_use]
    pub fn next_page(&self) -> Self {
        let mut next = self.clone();
        next.offset = next.offset.saturating_add(u64::from(self.limit));
        next
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Remote MIG API.
#[async_trait]
pub trait MigApi: Send + Sync {
    /// Submits a signed action and returns the authority's copy.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DispatchRejected`] when the authority refuses
    /// the action, or a transport/protocol error.
    async fn post_action(
        &self,
        action: &Action,
        auth: &dyn Authenticator,
    ) -> Result<Action, ClientError>;

    /// Fetches an action by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the fetch fails.
    async fn get_action(
        &self,
        id: ActionId,
        auth: &dyn Authenticator,
    ) -> Result<Action, ClientError>;

    /// Fetches a command by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the fetch fails.
    async fn get_command(
        &self,
        id: CommandId,
        auth: &dyn Authenticator,
    ) -> Result<Command, ClientError>;

    /// Fetches an investigator by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the fetch fails.
    async fn get_investigator(
        &self,
        id: InvestigatorId,
        auth: &dyn Authenticator,
    ) -> Result<Investigator, ClientError>;

    /// Returns one page of commands.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoResults`] when the page is past the end, or
    /// another [`ClientError`] when the search fails.
    async fn search_commands(
        &self,
        search: &CommandSearch,
        auth: &dyn Authenticator,
    ) -> Result<Vec<Command>, ClientError>;
}
