// crates/mig-core/src/operation.rs
// ============================================================================
// Module: Operations
// Description: Module invocations carried by an action and their compression.
// Purpose: Hold module parameters and convert them to and from the compressed
// wire form before signing.
// Dependencies: base64, flate2, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! An [`Operation`] names the agent module to run and carries its parameters
//! as arbitrary JSON. Large parameter documents may be shipped compressed: the
//! parameters are replaced by `base64(gzip(json))` and `is_compressed` is set.
//! Compression happens before signing, so signatures cover the compressed
//! text.
//!
//! Invariants:
//! - `is_compressed` implies `parameters` is a JSON string.
//! - Decompressed output is bounded by [`MAX_DECOMPRESSED_PARAMETERS_BYTES`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on decompressed parameter documents.
pub const MAX_DECOMPRESSED_PARAMETERS_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Operation compression errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// Parameters could not be serialized or parsed.
    #[error("operation parameters json error: {0}")]
    Json(String),
    /// Gzip stream failed.
    #[error("operation parameters compression error: {0}")]
    Compression(String),
    /// Base64 payload was malformed.
    #[error("operation parameters encoding error: {0}")]
    Encoding(String),
    /// Compressed parameters were not a string.
    #[error("compressed operation parameters must be a string")]
    NotAString,
    /// Decompressed payload exceeded the size limit.
    #[error("decompressed operation parameters exceed {MAX_DECOMPRESSED_PARAMETERS_BYTES} bytes")]
    TooLarge,
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// One module invocation within an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Agent module name.
    pub module: String,
    /// Module parameters, or their compressed text when `is_compressed`.
    pub parameters: Value,
    /// Parameters are currently in compressed form.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_compressed: bool,
    /// Parameters should be compressed before signing.
    #[serde(default, skip_serializing_if = "is_false")]
    pub want_compressed: bool,
}

impl Operation {
    /// Creates an uncompressed operation.
    #[must_use]
    pub fn new(module: impl Into<String>, parameters: Value) -> Self {
        Self {
            module: module.into(),
            parameters,
            is_compressed: false,
            want_compressed: false,
        }
    }

    /// Marks the operation for compression before signing.
    #[must_use]
    pub const fn with_compression(mut self) -> Self {
        self.want_compressed = true;
        self
    }

    /// Replaces the parameters with `base64(gzip(json))`.
    ///
    /// Already-compressed operations are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when serialization or compression fails.
    pub fn compress(&mut self) -> Result<(), OperationError> {
        if self.is_compressed {
            return Ok(());
        }
        let json = serde_json::to_vec(&self.parameters)
            .map_err(|err| OperationError::Json(err.to_string()))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(|err| OperationError::Compression(err.to_string()))?;
        let gz = encoder.finish().map_err(|err| OperationError::Compression(err.to_string()))?;
        self.parameters = Value::String(STANDARD.encode(gz));
        self.is_compressed = true;
        Ok(())
    }

    /// Restores compressed parameters to their JSON form.
    ///
    /// Uncompressed operations are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError`] when the payload is not a valid compressed
    /// parameter document.
    pub fn decompress(&mut self) -> Result<(), OperationError> {
        if !self.is_compressed {
            return Ok(());
        }
        let Value::String(text) = &self.parameters else {
            return Err(OperationError::NotAString);
        };
        let gz = STANDARD.decode(text).map_err(|err| OperationError::Encoding(err.to_string()))?;
        let limit = u64::try_from(MAX_DECOMPRESSED_PARAMETERS_BYTES).unwrap_or(u64::MAX);
        let mut decoder = GzDecoder::new(gz.as_slice()).take(limit.saturating_add(1));
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|err| OperationError::Compression(err.to_string()))?;
        if json.len() > MAX_DECOMPRESSED_PARAMETERS_BYTES {
            return Err(OperationError::TooLarge);
        }
        self.parameters =
            serde_json::from_slice(&json).map_err(|err| OperationError::Json(err.to_string()))?;
        self.is_compressed = false;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serde predicate for omitting false flags.
#[allow(clippy::trivially_copy_pass_by_ref, reason = "Serde skip predicates take references.")]
const fn is_false(value: &bool) -> bool {
    !*value
}
