// crates/mig-cli/src/inputs.rs
// ============================================================================
// Module: CLI Inputs
// Description: Bounded file reads, target parsing, and module construction.
// Purpose: Turn untrusted CLI inputs into validated queries and modules.
// Dependencies: mig-core, mig-targeting, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Targets are given as JSON: either one structured query object or an array
//! of them, each resolved with [`Query::from_structured_input`]. Several
//! queries are joined with AND when the action is created.
//!
//! Modules are named on the command line. `ping` parameters are decoded and
//! validated as a [`Ping`]; every other module passes its parameters through
//! as a [`RawModule`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use mig_core::Module;
use mig_core::ModuleError;
use mig_core::Ping;
use mig_core::RawModule;
use mig_targeting::Query;
use mig_targeting::QueryError;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a target or parameter JSON file.
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Input loading failures.
#[derive(Debug, Error)]
pub enum InputError {
    /// File I/O failure.
    #[error("failed to read {path}: {error}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        error: std::io::Error,
    },
    /// File size exceeds the limit.
    #[error("{path} is {size} bytes, larger than the {limit} byte limit")]
    TooLarge {
        /// Offending path.
        path: String,
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
    /// File is not valid JSON.
    #[error("{path} is not valid json: {error}")]
    Json {
        /// Offending path.
        path: String,
        /// Parser message.
        error: String,
    },
    /// Target input did not describe a query.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Module parameters were rejected.
    #[error(transparent)]
    Module(#[from] ModuleError),
}

// ============================================================================
// SECTION: File Reads
// ============================================================================

/// Reads a file while enforcing a hard size limit.
///
/// # Errors
///
/// Returns [`InputError::Io`] or [`InputError::TooLarge`].
pub fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, InputError> {
    let io_error = |error| InputError::Io {
        path: path.display().to_string(),
        error,
    };
    let too_large = |size| InputError::TooLarge {
        path: path.display().to_string(),
        size,
        limit: max_bytes,
    };
    let file = File::open(path).map_err(io_error)?;
    let size = file.metadata().map_err(io_error)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| too_large(size))?;
    if size > limit {
        return Err(too_large(size));
    }

    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(io_error)?;
    if bytes.len() > max_bytes {
        return Err(too_large(u64::try_from(bytes.len()).unwrap_or(u64::MAX)));
    }
    Ok(bytes)
}

/// Reads a size-bounded JSON document.
///
/// # Errors
///
/// Returns [`InputError`] for I/O, size, or parse failures.
pub fn read_json_file(path: &Path) -> Result<Value, InputError> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES)?;
    serde_json::from_slice(&bytes).map_err(|err| InputError::Json {
        path: path.display().to_string(),
        error: err.to_string(),
    })
}

// ============================================================================
// SECTION: Targets
// ============================================================================

/// Parses a target document into queries.
///
/// # Errors
///
/// Returns [`QueryError::EmptyQuery`] for an empty array and
/// [`QueryError::UnrecognizedQuery`] for entries no query variant accepts.
pub fn parse_targets(raw: &Value) -> Result<Vec<Query>, QueryError> {
    match raw {
        Value::Array(entries) if entries.is_empty() => Err(QueryError::EmptyQuery("target")),
        Value::Array(entries) => entries.iter().map(Query::from_structured_input).collect(),
        other => Ok(vec![Query::from_structured_input(other)?]),
    }
}

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Builds the module named `name` from JSON parameters.
///
/// # Errors
///
/// Returns [`ModuleError`] when the name is empty or `ping` parameters do
/// not decode.
pub fn build_module(name: &str, parameters: Value) -> Result<Box<dyn Module>, ModuleError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ModuleError::MissingName);
    }
    if name == "ping" {
        let ping: Ping =
            serde_json::from_value(parameters).map_err(|err| ModuleError::InvalidParameters {
                module: name.to_string(),
                reason: err.to_string(),
            })?;
        return Ok(Box::new(ping));
    }
    Ok(Box::new(RawModule::new(name, parameters)))
}
