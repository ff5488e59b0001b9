//! Node registry.
//!
//! # Data Flow
//! ```text
//! Prober / Failover Coordinator / admin updates
//!     → Registry (writer lock, copy-on-write)
//!     → ArcSwap publishes a new immutable Snapshot
//!     → Router loads the current Snapshot per decision (lock-free)
//! ```
//!
//! # Design Decisions
//! - Readers never lock; `snapshot()` is an `ArcSwap::load_full`
//! - All mutations rebuild the endpoint list under one writer mutex, so a
//!   reader can never observe zero or two primaries
//! - `promote` swaps both roles in a single published snapshot
//! - A demoted primary comes back as an unreachable replica until the
//!   prober re-verifies it; it never auto-regains the primary role

pub mod endpoint;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::{EndpointConfig, RoleConfig};
use crate::error::RouterError;

pub use endpoint::{EndpointId, EndpointState, HealthStatus, Role};

/// An immutable view of the topology at a point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    endpoints: Arc<[EndpointState]>,
}

impl Snapshot {
    fn new(endpoints: Vec<EndpointState>) -> Self {
        Self {
            endpoints: endpoints.into(),
        }
    }

    /// All endpoints, in configured order.
    pub fn endpoints(&self) -> &[EndpointState] {
        &self.endpoints
    }

    /// Look up an endpoint by id.
    pub fn get(&self, id: &EndpointId) -> Option<&EndpointState> {
        self.endpoints.iter().find(|e| &e.id == id)
    }

    /// The current primary. Snapshots always hold exactly one.
    pub fn primary(&self) -> &EndpointState {
        self.endpoints
            .iter()
            .find(|e| e.role == Role::Primary)
            .expect("snapshot invariant: exactly one primary")
    }

    /// All replica endpoints.
    pub fn replicas(&self) -> impl Iterator<Item = &EndpointState> {
        self.endpoints.iter().filter(|e| e.role == Role::Replica)
    }
}

/// An administrative topology update.
///
/// Supplied by the orchestrator collaborator: scale-out adds a replica,
/// node termination removes one. Removing the primary is rejected; the
/// failover coordinator owns primary changes.
#[derive(Debug, Clone)]
pub enum TopologyUpdate {
    AddReplica(EndpointConfig),
    Remove(EndpointId),
    /// Replace the whole endpoint set (config reload path).
    Replace(Vec<EndpointConfig>),
}

/// The node registry. Owns the authoritative endpoint set.
#[derive(Debug)]
pub struct Registry {
    current: ArcSwap<Snapshot>,
    /// Serializes all mutations. Held only on the update path.
    writer: Mutex<()>,
}

impl Registry {
    /// Build a registry from endpoint configuration.
    ///
    /// Rejects topologies without exactly one primary; `Snapshot::primary`
    /// relies on that invariant holding for every published snapshot.
    pub fn new(configs: &[EndpointConfig]) -> Result<Self, RouterError> {
        let primaries = configs
            .iter()
            .filter(|c| c.role == RoleConfig::Primary)
            .count();
        if primaries != 1 {
            return Err(RouterError::InvalidTopology(format!(
                "expected exactly one primary, found {primaries}"
            )));
        }
        let endpoints: Vec<EndpointState> =
            configs.iter().map(EndpointState::from_config).collect();
        Ok(Self {
            current: ArcSwap::from_pointee(Snapshot::new(endpoints)),
            writer: Mutex::new(()),
        })
    }

    /// Current topology snapshot. Lock-free; never blocks on writers.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Update the health status of one endpoint.
    pub fn update_health(&self, id: &EndpointId, status: HealthStatus) -> Result<(), RouterError> {
        self.mutate(id, |e| e.status = status)
    }

    /// Record the replication position and lag observed for one endpoint.
    pub fn record_position(
        &self,
        id: &EndpointId,
        position: u64,
        lag: Duration,
    ) -> Result<(), RouterError> {
        self.mutate(id, |e| {
            e.position = position;
            e.lag = lag;
        })
    }

    /// Atomically reassign the primary role to `id`.
    ///
    /// The previous primary is demoted to a replica and marked unreachable
    /// until the prober re-verifies it. Readers observe either the old
    /// snapshot or the new one, never an intermediate state.
    pub fn promote(&self, id: &EndpointId) -> Result<(), RouterError> {
        let _guard = self.writer.lock().expect("registry writer lock poisoned");
        let snapshot = self.current.load();
        if snapshot.get(id).is_none() {
            return Err(RouterError::UnknownEndpoint(id.clone()));
        }

        let mut endpoints: Vec<EndpointState> = snapshot.endpoints.to_vec();
        for endpoint in endpoints.iter_mut() {
            if &endpoint.id == id {
                endpoint.role = Role::Primary;
                endpoint.status = HealthStatus::Healthy;
            } else if endpoint.role == Role::Primary {
                endpoint.role = Role::Replica;
                endpoint.status = HealthStatus::Unreachable;
            }
        }

        tracing::warn!(new_primary = %id, "Primary role reassigned");
        self.current.store(Arc::new(Snapshot::new(endpoints)));
        Ok(())
    }

    /// Apply an administrative topology update.
    pub fn apply_topology(&self, update: TopologyUpdate) -> Result<(), RouterError> {
        let _guard = self.writer.lock().expect("registry writer lock poisoned");
        let snapshot = self.current.load();
        let mut endpoints: Vec<EndpointState> = snapshot.endpoints.to_vec();

        match update {
            TopologyUpdate::AddReplica(config) => {
                let state = EndpointState::from_config(&config);
                if snapshot.get(&state.id).is_some() {
                    // Re-adding a known node refreshes address and weight
                    // but keeps its observed health.
                    for endpoint in endpoints.iter_mut() {
                        if endpoint.id == state.id {
                            endpoint.address = state.address.clone();
                            endpoint.weight = state.weight;
                        }
                    }
                } else {
                    tracing::info!(endpoint = %state.id, address = %state.address, "Replica added");
                    endpoints.push(state);
                }
            }
            TopologyUpdate::Remove(id) => {
                let Some(found) = snapshot.get(&id) else {
                    return Err(RouterError::UnknownEndpoint(id));
                };
                if found.role == Role::Primary {
                    // The primary is only ever replaced via promote().
                    return Err(RouterError::PrimaryUnavailable);
                }
                tracing::info!(endpoint = %id, "Endpoint removed");
                endpoints.retain(|e| e.id != id);
            }
            TopologyUpdate::Replace(configs) => {
                let primaries = configs
                    .iter()
                    .filter(|c| c.role == RoleConfig::Primary)
                    .count();
                if primaries != 1 {
                    return Err(RouterError::InvalidTopology(format!(
                        "expected exactly one primary, found {primaries}"
                    )));
                }
                endpoints = configs
                    .iter()
                    .map(|c| {
                        // Carry over observed health for endpoints that survive
                        // the replacement.
                        let mut state = EndpointState::from_config(c);
                        if let Some(existing) = snapshot.get(&state.id) {
                            state.status = existing.status;
                            state.position = existing.position;
                            state.lag = existing.lag;
                        }
                        state
                    })
                    .collect();
                tracing::info!(endpoints = endpoints.len(), "Topology replaced");
            }
        }

        self.current.store(Arc::new(Snapshot::new(endpoints)));
        Ok(())
    }

    fn mutate(
        &self,
        id: &EndpointId,
        apply: impl FnOnce(&mut EndpointState),
    ) -> Result<(), RouterError> {
        let _guard = self.writer.lock().expect("registry writer lock poisoned");
        let snapshot = self.current.load();
        if snapshot.get(id).is_none() {
            return Err(RouterError::UnknownEndpoint(id.clone()));
        }

        let mut endpoints: Vec<EndpointState> = snapshot.endpoints.to_vec();
        if let Some(endpoint) = endpoints.iter_mut().find(|e| &e.id == id) {
            apply(endpoint);
        }
        self.current.store(Arc::new(Snapshot::new(endpoints)));
        Ok(())
    }
}
