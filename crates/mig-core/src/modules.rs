// crates/mig-core/src/modules.rs
// ============================================================================
// Module: Agent Modules
// Description: Client-side contract for building module operations.
// Purpose: Validate module parameters before they are signed and dispatched.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Agent modules run on endpoints; the client only needs to name a module and
//! produce validated parameters for it. [`Module`] is that contract.
//! [`Ping`] is a typed module with the same validation rules the agent
//! applies, and [`RawModule`] passes arbitrary JSON through for modules this
//! crate does not model.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::operation::Operation;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default ping attempts when none is given.
pub const DEFAULT_PING_COUNT: u32 = 3;
/// Default per-attempt timeout in seconds.
pub const DEFAULT_PING_TIMEOUT_SECS: f64 = 5.0;
/// Default destination port for TCP and UDP pings.
pub const DEFAULT_PING_PORT: u16 = 80;
/// Maximum host name length.
const MAX_HOSTNAME_LENGTH: usize = 253;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Module parameter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Module name is empty.
    #[error("module name is empty")]
    MissingName,
    /// Parameters failed validation.
    #[error("invalid {module} parameters: {reason}")]
    InvalidParameters {
        /// Module name.
        module: String,
        /// Failure description.
        reason: String,
    },
    /// Parameters could not be encoded.
    #[error("module parameters json error: {0}")]
    Json(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Client-side view of an agent module.
pub trait Module {
    /// Module name as registered on the agent.
    fn name(&self) -> &str;

    /// Returns validated parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] when the parameters are invalid.
    fn to_parameters(&self) -> Result<Value, ModuleError>;

    /// Builds an operation for this module.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] when the parameters are invalid.
    fn to_operation(&self) -> Result<Operation, ModuleError> {
        if self.name().trim().is_empty() {
            return Err(ModuleError::MissingName);
        }
        Ok(Operation::new(self.name(), self.to_parameters()?))
    }
}

// ============================================================================
// SECTION: Ping
// ============================================================================

/// Transport used by the ping module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingProtocol {
    /// ICMP echo.
    Icmp,
    /// TCP connect.
    #[default]
    Tcp,
    /// UDP probe.
    Udp,
}

/// Reachability probe parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    /// IPv4, IPv6, or host name.
    pub destination: String,
    /// Port for TCP and UDP; must be absent for ICMP.
    #[serde(default, rename = "destinationport", skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    /// Probe transport.
    #[serde(default)]
    pub protocol: PingProtocol,
    /// Number of probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Per-probe timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl Ping {
    /// Creates a TCP ping to `destination` with default settings.
    #[must_use]
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            destination_port: None,
            protocol: PingProtocol::Tcp,
            count: None,
            timeout: None,
        }
    }

    /// Checks the parameters and fills in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::InvalidParameters`] on the first violation.
    pub fn validated(&self) -> Result<Self, ModuleError> {
        let invalid = |reason: &str| ModuleError::InvalidParameters {
            module: "ping".to_string(),
            reason: reason.to_string(),
        };
        let destination = self.destination.trim();
        if destination.is_empty() {
            return Err(invalid("destination is empty"));
        }
        if destination.parse::<IpAddr>().is_err() && !is_hostname(destination) {
            return Err(invalid("destination is neither an ip address nor a host name"));
        }
        let destination_port = match (self.protocol, self.destination_port) {
            (PingProtocol::Icmp, Some(_)) => {
                return Err(invalid("icmp ping does not take a destination port"));
            }
            (PingProtocol::Icmp, None) => None,
            (_, Some(0)) => return Err(invalid("destination port must be between 1 and 65535")),
            (_, Some(port)) => Some(port),
            (_, None) => Some(DEFAULT_PING_PORT),
        };
        let count = match self.count {
            Some(0) | None => DEFAULT_PING_COUNT,
            Some(count) => count,
        };
        let timeout = match self.timeout {
            None => DEFAULT_PING_TIMEOUT_SECS,
            Some(timeout) if timeout.is_finite() && timeout > 0.0 => timeout,
            Some(_) => return Err(invalid("timeout must be a positive number of seconds")),
        };
        Ok(Self {
            destination: destination.to_string(),
            destination_port,
            protocol: self.protocol,
            count: Some(count),
            timeout: Some(timeout),
        })
    }
}

impl Module for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn to_parameters(&self) -> Result<Value, ModuleError> {
        let validated = self.validated()?;
        serde_json::to_value(validated).map_err(|err| ModuleError::Json(err.to_string()))
    }
}

// ============================================================================
// SECTION: Raw Module
// ============================================================================

/// Pass-through module for parameters this crate does not model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModule {
    /// Module name.
    pub module: String,
    /// Parameters as given.
    pub parameters: Value,
}

impl RawModule {
    /// Creates a raw module invocation.
    #[must_use]
    pub fn new(module: impl Into<String>, parameters: Value) -> Self {
        Self {
            module: module.into(),
            parameters,
        }
    }
}

impl Module for RawModule {
    fn name(&self) -> &str {
        &self.module
    }

    fn to_parameters(&self) -> Result<Value, ModuleError> {
        if !self.parameters.is_object() {
            return Err(ModuleError::InvalidParameters {
                module: self.module.clone(),
                reason: "parameters must be a json object".to_string(),
            });
        }
        Ok(self.parameters.clone())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true for a syntactically valid DNS host name.
fn is_hostname(value: &str) -> bool {
    value.len() <= MAX_HOSTNAME_LENGTH
        && value.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        })
}
