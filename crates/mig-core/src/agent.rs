// crates/mig-core/src/agent.rs
// ============================================================================
// Module: Agents
// Description: Agent registration records and their target attributes.
// Purpose: Give target expressions something concrete to evaluate against.
// Dependencies: mig-targeting, serde, time
// ============================================================================

//! ## Overview
//! [`AgentRecord`] mirrors what an agent reports when it registers: identity,
//! queue location, build version, heartbeat, host environment, and
//! operator-assigned tags. It implements [`AgentAttributes`], so a compiled
//! [`mig_targeting::TargetExpr`] can select agents in memory exactly as the
//! rendered predicate would in the agent database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use mig_targeting::AgentAttributes;
use mig_targeting::EnvironmentKey;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::AgentId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Agent liveness status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Heartbeating and accepting commands.
    Online,
    /// Replaced by a newer build.
    Upgraded,
    /// Destroyed by an operator.
    Destroyed,
    /// Heartbeat lost.
    Offline,
    /// Online but not accepting commands.
    Idle,
}

impl AgentStatus {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Upgraded => "upgraded",
            Self::Destroyed => "destroyed",
            Self::Offline => "offline",
            Self::Idle => "idle",
        }
    }
}

/// Host environment reported by an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEnvironment {
    /// Init system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
    /// Operating system identification string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<String>,
    /// Operating system family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// CPU architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Agent reaches the relay through a proxy.
    #[serde(default, rename = "isproxied")]
    pub is_proxied: bool,
    /// Proxy address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Local interface addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    /// Public IP seen by the platform.
    #[serde(default, rename = "publicip", skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

/// Registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent identifier.
    pub id: AgentId,
    /// Agent name, usually the host name.
    pub name: String,
    /// Queue the agent listens on.
    #[serde(rename = "queueloc")]
    pub queue_location: String,
    /// Run mode (`daemon`, `checkin`, ...).
    #[serde(default)]
    pub mode: String,
    /// Build version.
    #[serde(default)]
    pub version: String,
    /// Process identifier.
    #[serde(default)]
    pub pid: u64,
    /// Liveness status.
    pub status: AgentStatus,
    /// Last heartbeat.
    #[serde(
        default,
        rename = "heartbeatts",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat: Option<OffsetDateTime>,
    /// Host environment.
    #[serde(default, rename = "environment")]
    pub environment: AgentEnvironment,
    /// Operator-assigned tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl AgentRecord {
    /// Creates an online agent with an empty environment and no tags.
    #[must_use]
    pub fn online(id: AgentId, name: impl Into<String>, queue_location: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            queue_location: queue_location.into(),
            mode: String::new(),
            version: String::new(),
            pid: 0,
            status: AgentStatus::Online,
            heartbeat: None,
            environment: AgentEnvironment::default(),
            tags: BTreeMap::new(),
        }
    }

    /// Adds or replaces a tag.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }
}

impl AgentAttributes for AgentRecord {
    fn agent_id(&self) -> u64 {
        self.id.get()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn queue_location(&self) -> &str {
        &self.queue_location
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn pid(&self) -> u64 {
        self.pid
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    fn environment(&self, key: EnvironmentKey) -> Option<&str> {
        match key {
            EnvironmentKey::Ident => self.environment.ident.as_deref(),
            EnvironmentKey::Os => self.environment.os.as_deref(),
            EnvironmentKey::Arch => self.environment.arch.as_deref(),
            EnvironmentKey::PublicIp => self.environment.public_ip.as_deref(),
        }
    }
}
