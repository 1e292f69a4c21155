// crates/mig-targeting/src/lib.rs
// ============================================================================
// Module: MIG Targeting Library
// Description: Agent-selection query algebra and compiled target predicates.
// Purpose: Compile structured selection criteria into predicates that render
// to SQL for the agent database and evaluate locally against agent records.
// Dependencies: serde, serde_json, smallvec, thiserror
// ============================================================================

//! ## Overview
//! `mig-targeting` is the leaf crate of the workspace. Investigators describe
//! which endpoints an action applies to with [`Query`] values; the crate
//! compiles them into a [`TargetExpr`] tree. The tree renders to the
//! `WHERE`-clause text consumed by the remote agent store and can also be
//! evaluated in-process against any [`AgentAttributes`] implementation.
//!
//! Security posture: query input is untrusted; text literals are always
//! quoted and escaped when rendered.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod expr;
pub mod query;

#[cfg(test)]
mod tests;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use expr::AgentAttributes;
pub use expr::Clause;
pub use expr::EnvironmentKey;
pub use expr::MatchOp;
pub use expr::TargetExpr;
pub use expr::TargetField;
pub use expr::TargetValue;
pub use expr::like_matches;
pub use query::ByAgentDetails;
pub use query::ByHostDetails;
pub use query::ByTag;
pub use query::POPULATE_ORDER;
pub use query::Query;
pub use query::QueryError;
pub use query::QueryKind;
pub use query::compile_all;
