// crates/mig-targeting/src/query.rs
// ============================================================================
// Module: Target Queries
// Description: Structured agent-selection queries and their compiler.
// Purpose: Turn investigator-supplied selection criteria into target
// expressions with typed failures for empty or unrecognized input.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Queries are the user-facing vocabulary for selecting agents: every online
//! agent, agents carrying a tag, agents matching agent details, or agents
//! matching host details. Each variant can be populated from structured JSON
//! input and compiled into a [`TargetExpr`]. Several queries combine into one
//! action target with logical AND.
//!
//! Invariants:
//! - Detail queries fail with [`QueryError::EmptyQuery`] when every field is absent.
//! - Structured input is tried against variants in the fixed order of
//!   [`POPULATE_ORDER`]; unknown keys never match a variant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::expr::Clause;
use crate::expr::EnvironmentKey;
use crate::expr::TargetExpr;
use crate::expr::TargetField;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Query population and compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Every optional field of a detail query was absent.
    #[error("empty query: {0} requires at least one field to match against")]
    EmptyQuery(&'static str),
    /// No query variant accepted the structured input.
    #[error("unrecognized query input")]
    UnrecognizedQuery,
    /// The query is the invalid sentinel or is otherwise malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

// ============================================================================
// SECTION: Query Kinds
// ============================================================================

/// Discriminant naming each query variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// [`Query::All`].
    All,
    /// [`Query::ByTag`].
    ByTag,
    /// [`Query::ByAgentDetails`].
    ByAgentDetails,
    /// [`Query::ByHostDetails`].
    ByHostDetails,
    /// [`Query::Invalid`].
    Invalid,
}

/// Fixed trial order used by [`Query::from_structured_input`].
pub const POPULATE_ORDER: [QueryKind; 4] =
    [QueryKind::ByAgentDetails, QueryKind::ByHostDetails, QueryKind::ByTag, QueryKind::All];

// ============================================================================
// SECTION: Variants
// ============================================================================

/// Selects agents carrying `tag_name = tag_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ByTag {
    /// Tag key.
    pub tag_name: String,
    /// Expected tag value.
    pub tag_value: String,
}

impl ByTag {
    /// Creates a tag query.
    #[must_use]
    pub fn new(tag_name: impl Into<String>, tag_value: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            tag_value: tag_value.into(),
        }
    }

    /// Compiles the query into a tag equality clause.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidQuery`] when the tag name is empty.
    pub fn compile(&self) -> Result<TargetExpr, QueryError> {
        if self.tag_name.is_empty() {
            return Err(QueryError::InvalidQuery("tag name must be non-empty".to_string()));
        }
        Ok(TargetExpr::Clause(Clause::text_equals(
            TargetField::Tag(self.tag_name.clone()),
            self.tag_value.clone(),
        )))
    }
}

/// Selects agents by agent-record attributes; present fields are ANDed.
///
/// Text fields are `LIKE` patterns except `status`, which is matched exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ByAgentDetails {
    /// Agent identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Agent name pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Queue location pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_location: Option<String>,
    /// Agent version pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Agent process id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    /// Agent status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ByAgentDetails {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.name.is_none()
            && self.queue_location.is_none()
            && self.version.is_none()
            && self.pid.is_none()
            && self.status.is_none()
    }

    /// Compiles the present fields into a conjunction.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyQuery`] when every field is absent.
    pub fn compile(&self) -> Result<TargetExpr, QueryError> {
        if self.is_empty() {
            return Err(QueryError::EmptyQuery("agent details"));
        }
        let mut clauses = Vec::new();
        if let Some(id) = self.id {
            clauses.push(Clause::integer_equals(TargetField::AgentId, id));
        }
        if let Some(name) = &self.name {
            clauses.push(Clause::text_like(TargetField::Name, name.clone()));
        }
        if let Some(queue_location) = &self.queue_location {
            clauses.push(Clause::text_like(TargetField::QueueLocation, queue_location.clone()));
        }
        if let Some(version) = &self.version {
            clauses.push(Clause::text_like(TargetField::Version, version.clone()));
        }
        if let Some(pid) = self.pid {
            clauses.push(Clause::integer_equals(TargetField::Pid, pid));
        }
        if let Some(status) = &self.status {
            clauses.push(Clause::text_equals(TargetField::Status, status.clone()));
        }
        Ok(TargetExpr::all_of(clauses.into_iter().map(TargetExpr::Clause).collect()))
    }
}

/// Selects agents by host environment attributes; present fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ByHostDetails {
    /// Operating system identification string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
    /// Operating system family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// CPU architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Public IP address.
    #[serde(default, rename = "publicIP", skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

impl ByHostDetails {
    /// Returns true when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ident.is_none() && self.os.is_none() && self.arch.is_none() && self.public_ip.is_none()
    }

    /// Compiles the present fields into a conjunction.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyQuery`] when every field is absent.
    pub fn compile(&self) -> Result<TargetExpr, QueryError> {
        if self.is_empty() {
            return Err(QueryError::EmptyQuery("host details"));
        }
        let fields = [
            (EnvironmentKey::Ident, &self.ident),
            (EnvironmentKey::Os, &self.os),
            (EnvironmentKey::Arch, &self.arch),
            (EnvironmentKey::PublicIp, &self.public_ip),
        ];
        let clauses = fields
            .into_iter()
            .filter_map(|(key, value)| {
                value.as_ref().map(|value| {
                    TargetExpr::Clause(Clause::text_equals(
                        TargetField::Environment(key),
                        value.clone(),
                    ))
                })
            })
            .collect();
        Ok(TargetExpr::all_of(clauses))
    }
}

/// Structured form accepted for [`Query::All`]: `{"all": true}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllInput {
    /// Must be `true`.
    all: bool,
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// Agent-selection query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "query", rename_all = "snake_case")]
pub enum Query {
    /// Every currently online agent.
    All,
    /// Agents carrying a tag.
    ByTag(ByTag),
    /// Agents matching agent-record attributes.
    ByAgentDetails(ByAgentDetails),
    /// Agents matching host attributes.
    ByHostDetails(ByHostDetails),
    /// Sentinel for malformed input; never compiles or populates.
    Invalid,
}

impl Query {
    /// Returns the variant discriminant.
    #[must_use]
    pub const fn kind(&self) -> QueryKind {
        match self {
            Self::All => QueryKind::All,
            Self::ByTag(_) => QueryKind::ByTag,
            Self::ByAgentDetails(_) => QueryKind::ByAgentDetails,
            Self::ByHostDetails(_) => QueryKind::ByHostDetails,
            Self::Invalid => QueryKind::Invalid,
        }
    }

    /// Compiles the query into a target expression.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the query is empty or invalid.
    pub fn compile(&self) -> Result<TargetExpr, QueryError> {
        match self {
            Self::All => Ok(TargetExpr::online_agents()),
            Self::ByTag(query) => query.compile(),
            Self::ByAgentDetails(query) => query.compile(),
            Self::ByHostDetails(query) => query.compile(),
            Self::Invalid => {
                Err(QueryError::InvalidQuery("the invalid query cannot be compiled".to_string()))
            }
        }
    }

    /// Populates a query of the given kind from structured input.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the input does not describe that variant.
    pub fn populate(kind: QueryKind, raw: &Value) -> Result<Self, QueryError> {
        if !raw.is_object() {
            return Err(QueryError::InvalidQuery("query input must be an object".to_string()));
        }
        match kind {
            QueryKind::All => {
                let input: AllInput = decode(raw)?;
                if input.all {
                    Ok(Self::All)
                } else {
                    Err(QueryError::InvalidQuery("\"all\" must be true".to_string()))
                }
            }
            QueryKind::ByTag => decode(raw).map(Self::ByTag),
            QueryKind::ByAgentDetails => {
                let query: ByAgentDetails = decode(raw)?;
                if query.is_empty() {
                    return Err(QueryError::EmptyQuery("agent details"));
                }
                Ok(Self::ByAgentDetails(query))
            }
            QueryKind::ByHostDetails => {
                let query: ByHostDetails = decode(raw)?;
                if query.is_empty() {
                    return Err(QueryError::EmptyQuery("host details"));
                }
                Ok(Self::ByHostDetails(query))
            }
            QueryKind::Invalid => {
                Err(QueryError::InvalidQuery("the invalid query cannot be populated".to_string()))
            }
        }
    }

    /// Builds a query from structured input by trying each variant in
    /// [`POPULATE_ORDER`] and returning the first that accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnrecognizedQuery`] when no variant accepts the
    /// input; callers that need a placeholder use [`Query::Invalid`].
    pub fn from_structured_input(raw: &Value) -> Result<Self, QueryError> {
        POPULATE_ORDER
            .iter()
            .find_map(|kind| Self::populate(*kind, raw).ok())
            .ok_or(QueryError::UnrecognizedQuery)
    }
}

impl From<ByTag> for Query {
    fn from(query: ByTag) -> Self {
        Self::ByTag(query)
    }
}

impl From<ByAgentDetails> for Query {
    fn from(query: ByAgentDetails) -> Self {
        Self::ByAgentDetails(query)
    }
}

impl From<ByHostDetails> for Query {
    fn from(query: ByHostDetails) -> Self {
        Self::ByHostDetails(query)
    }
}

// ============================================================================
// SECTION: Composition
// ============================================================================

/// Compiles several queries and joins them with logical AND.
///
/// # Errors
///
/// Returns [`QueryError::EmptyQuery`] when `queries` is empty, or the first
/// compilation failure.
pub fn compile_all(queries: &[Query]) -> Result<TargetExpr, QueryError> {
    if queries.is_empty() {
        return Err(QueryError::EmptyQuery("target"));
    }
    let compiled = queries.iter().map(Query::compile).collect::<Result<Vec<_>, _>>()?;
    Ok(TargetExpr::all_of(compiled))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes a variant from a JSON object, mapping failures to invalid input.
fn decode<T: DeserializeOwned>(raw: &Value) -> Result<T, QueryError> {
    T::deserialize(raw).map_err(|err| QueryError::InvalidQuery(err.to_string()))
}
