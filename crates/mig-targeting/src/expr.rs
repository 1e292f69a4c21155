// crates/mig-targeting/src/expr.rs
// ============================================================================
// Module: Target Expressions
// Description: Compiled agent-selection predicates and their evaluation.
// Purpose: Render SQL where-clauses for the remote query engine and evaluate
// the same predicate locally against agent records.
// Dependencies: serde, smallvec
// ============================================================================

//! ## Overview
//! A [`TargetExpr`] is the compiled form of one or more target queries. It is
//! a conjunction tree whose leaves are [`Clause`] comparisons on agent
//! columns, tags, or host environment attributes. The tree renders to the SQL
//! predicate text consumed by the agent database and can be evaluated
//! in-process through [`AgentAttributes`].
//!
//! Invariants:
//! - Text values are rendered single-quoted with embedded quotes doubled.
//! - Conjunctions render their children joined with `" AND "` in order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

// ============================================================================
// SECTION: Agent Attributes
// ============================================================================

/// Host environment attributes addressable by target queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKey {
    /// Operating system identification string.
    Ident,
    /// Operating system family.
    Os,
    /// CPU architecture.
    Arch,
    /// Public IP address seen by the platform.
    PublicIp,
}

impl EnvironmentKey {
    /// Returns the JSON key used in the agent environment document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ident => "ident",
            Self::Os => "os",
            Self::Arch => "arch",
            Self::PublicIp => "publicip",
        }
    }
}

/// Read-only view of an agent used for local target evaluation.
pub trait AgentAttributes {
    /// Numeric agent identifier.
    fn agent_id(&self) -> u64;
    /// Agent name (usually the host name).
    fn name(&self) -> &str;
    /// Queue location the agent listens on.
    fn queue_location(&self) -> &str;
    /// Agent build version.
    fn version(&self) -> &str;
    /// Agent process identifier.
    fn pid(&self) -> u64;
    /// Agent status (`online`, `idle`, `offline`, ...).
    fn status(&self) -> &str;
    /// Tag value stored under `name`, if any.
    fn tag(&self, name: &str) -> Option<&str>;
    /// Host environment attribute, if reported.
    fn environment(&self, key: EnvironmentKey) -> Option<&str>;
}

// ============================================================================
// SECTION: Clauses
// ============================================================================

/// Column or document path a clause compares against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum TargetField {
    /// Agent identifier column.
    AgentId,
    /// Agent name column.
    Name,
    /// Agent queue location column.
    QueueLocation,
    /// Agent version column.
    Version,
    /// Agent process id column.
    Pid,
    /// Agent status column.
    Status,
    /// Tag value under the given tag name.
    Tag(String),
    /// Host environment attribute.
    Environment(EnvironmentKey),
}

impl TargetField {
    /// Writes the SQL column expression for this field.
    fn write_sql(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentId => f.write_str("id"),
            Self::Name => f.write_str("name"),
            Self::QueueLocation => f.write_str("queueloc"),
            Self::Version => f.write_str("version"),
            Self::Pid => f.write_str("pid"),
            Self::Status => f.write_str("status"),
            Self::Tag(name) => write!(f, "tags->>{}", quote(name)),
            Self::Environment(key) => write!(f, "environment->>'{}'", key.as_str()),
        }
    }
}

/// Comparison operator for a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOp {
    /// Exact equality.
    Equals,
    /// SQL `LIKE` pattern match (`%` any run, `_` any single character).
    Like,
}

/// Literal value on the right-hand side of a clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetValue {
    /// Unsigned integer literal.
    Integer(u64),
    /// Text literal.
    Text(String),
}

/// Single comparison between an agent field and a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clause {
    /// Field being compared.
    pub field: TargetField,
    /// Comparison operator.
    pub op: MatchOp,
    /// Literal operand.
    pub value: TargetValue,
}

impl Clause {
    /// Builds an equality clause against a text literal.
    #[must_use]
    pub fn text_equals(field: TargetField, value: impl Into<String>) -> Self {
        Self {
            field,
            op: MatchOp::Equals,
            value: TargetValue::Text(value.into()),
        }
    }

    /// Builds a `LIKE` clause against a text pattern.
    #[must_use]
    pub fn text_like(field: TargetField, pattern: impl Into<String>) -> Self {
        Self {
            field,
            op: MatchOp::Like,
            value: TargetValue::Text(pattern.into()),
        }
    }

    /// Builds an equality clause against an integer literal.
    #[must_use]
    pub const fn integer_equals(field: TargetField, value: u64) -> Self {
        Self {
            field,
            op: MatchOp::Equals,
            value: TargetValue::Integer(value),
        }
    }

    /// Evaluates the clause against an agent.
    #[must_use]
    pub fn matches<A: AgentAttributes + ?Sized>(&self, agent: &A) -> bool {
        let actual = match &self.field {
            TargetField::AgentId => FieldValue::Integer(agent.agent_id()),
            TargetField::Pid => FieldValue::Integer(agent.pid()),
            TargetField::Name => FieldValue::Text(agent.name()),
            TargetField::QueueLocation => FieldValue::Text(agent.queue_location()),
            TargetField::Version => FieldValue::Text(agent.version()),
            TargetField::Status => FieldValue::Text(agent.status()),
            TargetField::Tag(name) => match agent.tag(name) {
                Some(value) => FieldValue::Text(value),
                None => return false,
            },
            TargetField::Environment(key) => match agent.environment(*key) {
                Some(value) => FieldValue::Text(value),
                None => return false,
            },
        };
        match (actual, &self.value, self.op) {
            (FieldValue::Integer(left), TargetValue::Integer(right), _) => left == *right,
            (FieldValue::Text(left), TargetValue::Text(right), MatchOp::Equals) => left == right,
            (FieldValue::Text(left), TargetValue::Text(right), MatchOp::Like) => {
                like_matches(right, left)
            }
            (FieldValue::Integer(left), TargetValue::Text(right), MatchOp::Equals) => {
                left.to_string() == *right
            }
            (FieldValue::Integer(left), TargetValue::Text(right), MatchOp::Like) => {
                like_matches(right, &left.to_string())
            }
            (FieldValue::Text(left), TargetValue::Integer(right), _) => left == right.to_string(),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.field.write_sql(f)?;
        match self.op {
            MatchOp::Equals => f.write_str(" = ")?,
            MatchOp::Like => f.write_str(" LIKE ")?,
        }
        match &self.value {
            TargetValue::Integer(value) => write!(f, "{value}"),
            TargetValue::Text(value) => f.write_str(&quote(value)),
        }
    }
}

/// Agent-side value resolved for a clause.
enum FieldValue<'a> {
    /// Numeric column value.
    Integer(u64),
    /// Text column value.
    Text(&'a str),
}

// ============================================================================
// SECTION: Expressions
// ============================================================================

/// Compiled target predicate.
///
/// # Invariants
/// - `And` children are evaluated and rendered in insertion order.
/// - An empty `And` never results from compilation; it evaluates to `true`
///   and renders as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetExpr {
    /// Leaf comparison.
    Clause(Clause),
    /// Conjunction of sub-expressions.
    And(SmallVec<[Box<Self>; 4]>),
}

impl TargetExpr {
    /// Predicate selecting every online agent.
    #[must_use]
    pub fn online_agents() -> Self {
        Self::Clause(Clause::text_equals(TargetField::Status, "online"))
    }

    /// Builds a conjunction from the provided expressions.
    ///
    /// A single expression is returned unchanged rather than wrapped.
    #[must_use]
    pub fn all_of(mut exprs: Vec<Self>) -> Self {
        if exprs.len() == 1 {
            if let Some(only) = exprs.pop() {
                return only;
            }
        }
        Self::And(exprs.into_iter().map(Box::new).collect())
    }

    /// Returns true when every clause in the expression matches the agent.
    #[must_use]
    pub fn matches<A: AgentAttributes + ?Sized>(&self, agent: &A) -> bool {
        match self {
            Self::Clause(clause) => clause.matches(agent),
            Self::And(children) => children.iter().all(|child| child.matches(agent)),
        }
    }

    /// Renders the expression as an SQL where-clause.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.to_string()
    }

    /// Returns the number of leaf clauses in the expression.
    #[must_use]
    pub fn clause_count(&self) -> usize {
        match self {
            Self::Clause(_) => 1,
            Self::And(children) => children.iter().map(|child| child.clause_count()).sum(),
        }
    }
}

impl fmt::Display for TargetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clause(clause) => clause.fmt(f),
            Self::And(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" AND ")?;
                    }
                    child.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Quotes a text literal for SQL, doubling embedded single quotes.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Case-sensitive SQL `LIKE` matching with `%` and `_` wildcards.
#[must_use]
pub fn like_matches(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    let (mut p, mut v) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while v < value.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, v));
                p += 1;
            }
            Some('_') => {
                p += 1;
                v += 1;
            }
            Some(ch) if *ch == value[v] => {
                p += 1;
                v += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    v = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p ..].iter().all(|ch| *ch == '%')
}
