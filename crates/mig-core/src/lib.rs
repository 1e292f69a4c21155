// crates/mig-core/src/lib.rs
// ============================================================================
// Module: MIG Core Library
// Description: Action, command, and agent model with lifecycle rules.
// Purpose: Shared vocabulary for authorities, clients, and tooling.
// Dependencies: mig-targeting, serde, serde_jcs, time
// ============================================================================

//! ## Overview
//! `mig-core` defines the entities that flow between investigators, the
//! authority, and agents: [`Action`], [`Command`], [`AgentRecord`], their
//! identifiers, and the lifecycle rules an authority enforces. It performs no
//! I/O and holds no global state; time is injected through [`Clock`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod action;
pub mod agent;
pub mod clock;
pub mod command;
pub mod identifiers;
pub mod modules;
pub mod operation;

#[cfg(test)]
mod tests;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use action::ACTION_SYNTAX_VERSION;
pub use action::Action;
pub use action::ActionCounters;
pub use action::ActionStatus;
pub use action::CountersError;
pub use action::Description;
pub use action::LifecycleError;
pub use action::Threat;
pub use action::format_instant;
pub use agent::AgentEnvironment;
pub use agent::AgentRecord;
pub use agent::AgentStatus;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use command::Command;
pub use command::CommandAgent;
pub use command::CommandError;
pub use command::CommandStatus;
pub use command::ModuleResult;
pub use identifiers::ActionId;
pub use identifiers::AgentId;
pub use identifiers::CommandId;
pub use identifiers::Fingerprint;
pub use identifiers::FingerprintError;
pub use identifiers::IdGenerator;
pub use identifiers::InvestigatorId;
pub use identifiers::LocalActionId;
pub use modules::Module;
pub use modules::ModuleError;
pub use modules::Ping;
pub use modules::PingProtocol;
pub use modules::RawModule;
pub use operation::Operation;
pub use operation::OperationError;
