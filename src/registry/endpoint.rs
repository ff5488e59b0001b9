//! Endpoint model.
//!
//! # Responsibilities
//! - Identify a single database node (id, dial address)
//! - Carry role, weight, health status and replication position
//! - Stay immutable inside a snapshot; the registry publishes a new
//!   snapshot for every change

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{EndpointConfig, RoleConfig};

/// Stable identifier of an endpoint (the configured name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role of an endpoint. Exactly one endpoint per snapshot holds `Primary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Replica,
}

impl From<RoleConfig> for Role {
    fn from(role: RoleConfig) -> Self {
        match role {
            RoleConfig::Primary => Role::Primary,
            RoleConfig::Replica => Role::Replica,
        }
    }
}

/// Health classification of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not probed yet. Treated like healthy so a fresh topology can serve
    /// traffic before the first probe cycle completes.
    Unknown,
    /// Reachable, lag within threshold.
    Healthy,
    /// Reachable but lagging. Eligible for `eventual` reads only.
    Degraded,
    /// Failed the consecutive-failure threshold. Receives no traffic.
    Unreachable,
}

impl HealthStatus {
    /// Reachable states; anything but `Unreachable`.
    pub fn is_reachable(self) -> bool {
        self != HealthStatus::Unreachable
    }
}

/// Immutable per-endpoint state carried inside a snapshot.
#[derive(Debug, Clone)]
pub struct EndpointState {
    pub id: EndpointId,
    pub address: String,
    pub role: Role,
    pub weight: u32,
    pub status: HealthStatus,
    /// Last applied replication position observed by the prober. Opaque,
    /// monotonically increasing per cluster.
    pub position: u64,
    /// Last observed replication lag (zero for the primary).
    pub lag: Duration,
}

impl EndpointState {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            id: EndpointId::from(config.name.clone()),
            address: config.address.clone(),
            role: config.role.into(),
            weight: config.weight,
            status: HealthStatus::Unknown,
            position: 0,
            lag: Duration::ZERO,
        }
    }
}
