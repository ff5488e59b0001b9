//! Point-in-time status report.
//!
//! The pull-side observability surface: a serializable snapshot of endpoint
//! health, circuit states, pool utilization and the failover state, for the
//! telemetry collaborator to export however it likes.

use serde::Serialize;

use crate::failover::ClusterState;
use crate::pool::{PoolManager, PoolUtilization};
use crate::registry::{EndpointId, HealthStatus, Registry, Role};
use crate::resilience::{CircuitRegistry, CircuitState};

#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    pub id: EndpointId,
    pub address: String,
    pub role: Role,
    pub status: HealthStatus,
    pub weight: u32,
    pub position: u64,
    pub lag_ms: u64,
    pub circuit: CircuitState,
    pub pool: PoolUtilization,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub failing_over: bool,
    pub endpoints: Vec<EndpointReport>,
}

impl StatusReport {
    pub fn collect(
        registry: &Registry,
        circuits: &CircuitRegistry,
        pools: &PoolManager,
        cluster: &ClusterState,
    ) -> Self {
        let snapshot = registry.snapshot();
        let endpoints = snapshot
            .endpoints()
            .iter()
            .map(|e| EndpointReport {
                id: e.id.clone(),
                address: e.address.clone(),
                role: e.role,
                status: e.status,
                weight: e.weight,
                position: e.position,
                lag_ms: e.lag.as_millis() as u64,
                circuit: circuits.state(&e.id),
                pool: pools.utilization(&e.id),
            })
            .collect();

        Self {
            failing_over: cluster.is_failing_over(),
            endpoints,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
