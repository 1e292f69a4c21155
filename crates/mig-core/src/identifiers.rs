// crates/mig-core/src/identifiers.rs
// ============================================================================
// Module: MIG Identifiers
// Description: Strongly typed identifiers for keys, actions, commands, and agents.
// Purpose: Keep fingerprints and numeric IDs from being mixed up at API seams.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Fingerprints are opaque, scheme-agnostic key identifiers. They are
//! normalized to uppercase on construction so that equality is
//! case-insensitive everywhere a fingerprint is compared. Numeric identifiers
//! are assigned by the authority through [`IdGenerator`]; local action IDs are
//! assigned by the client catalog and never leave the client.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Unix timestamp the numeric ID space is anchored to.
pub const ID_EPOCH_UNIX: i64 = 1_367_258_400;

/// Maximum accepted fingerprint length in characters.
pub const MAX_FINGERPRINT_LENGTH: usize = 128;

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Fingerprint validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    /// Fingerprint was empty after trimming.
    #[error("fingerprint is empty")]
    Empty,
    /// Fingerprint exceeded [`MAX_FINGERPRINT_LENGTH`].
    #[error("fingerprint exceeds {MAX_FINGERPRINT_LENGTH} characters")]
    TooLong,
    /// Fingerprint contained a non-alphanumeric character.
    #[error("fingerprint contains invalid character: {0}")]
    InvalidCharacter(char),
}

/// Opaque key fingerprint.
///
/// # Invariants
/// - Non-empty, at most [`MAX_FINGERPRINT_LENGTH`] ASCII alphanumerics.
/// - Stored uppercase; two fingerprints differing only in case are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses and normalizes a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError`] when the input is empty, too long, or
    /// contains characters other than ASCII letters and digits.
    pub fn parse(value: &str) -> Result<Self, FingerprintError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FingerprintError::Empty);
        }
        if trimmed.len() > MAX_FINGERPRINT_LENGTH {
            return Err(FingerprintError::TooLong);
        }
        if let Some(bad) = trimmed.chars().find(|ch| !ch.is_ascii_alphanumeric()) {
            return Err(FingerprintError::InvalidCharacter(bad));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the canonical uppercase form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when `other` names the same fingerprint, ignoring case.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Authority-assigned action identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(u64);

impl ActionId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-agent command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registered agent identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(u64);

impl AgentId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Registered investigator identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestigatorId(u64);

impl InvestigatorId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvestigatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Client-local catalog key; never sent to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalActionId(String);

impl LocalActionId {
    /// Creates a local identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for LocalActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Monotonic numeric ID generator seeded from wall-clock time.
///
/// The first ID is `(seconds since ID_EPOCH_UNIX + 1) << 16`; every later ID
/// increments by one, so IDs from one generator are strictly increasing.
#[derive(Debug, Default)]
pub struct IdGenerator {
    /// Last issued value; zero before the first call.
    last: Mutex<u64>,
}

impl IdGenerator {
    /// Creates an unseeded generator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(0),
        }
    }

    /// Issues the next identifier, seeding from `now` on first use.
    #[must_use]
    pub fn next_id(&self, now: OffsetDateTime) -> u64 {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = if *last == 0 {
            let elapsed = now.unix_timestamp().saturating_sub(ID_EPOCH_UNIX).max(0) + 1;
            u64::try_from(elapsed).unwrap_or(1) << 16
        } else {
            last.saturating_add(1)
        };
        *last
    }
}
