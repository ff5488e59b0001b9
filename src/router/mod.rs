//! Query routing.
//!
//! # Data Flow
//! ```text
//! execute(operation)
//!     → classify (write | read, consistency tag)
//!     → registry snapshot (lock-free)
//!     → select.rs: weighted cursor over eligible endpoints
//!     → circuit breaker gate
//!     → pool acquire (bounded by deadline)
//!     → network call (bounded by deadline)
//!     → retry per resilience policy, reselecting each attempt
//! ```
//!
//! # Design Decisions
//! - Writes go to the snapshot's primary, always; replicas are matched
//!   exhaustively by role so a new role cannot slip through selection
//! - Read-your-writes with no caught-up replica deliberately overrides
//!   load spreading and reads from the primary
//! - Eventual reads with no eligible replica fail fast instead of
//!   silently piling onto the primary
//! - A deadline hit mid-call invalidates the connection; a late reply must
//!   never leak into another caller

pub mod operation;
pub mod select;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::time;
use uuid::Uuid;

use crate::config::{ConfigWatcher, RouterConfig};
use crate::error::RouterError;
use crate::failover::{ClusterState, FailoverCoordinator};
use crate::health::HealthProber;
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, StatusReport};
use crate::pool::{ConnectionError, Connector, PoolManager};
use crate::registry::{EndpointId, EndpointState, HealthStatus, Registry, Snapshot, TopologyUpdate};
use crate::resilience::{CircuitRegistry, RetryPolicy};

pub use operation::{Consistency, Operation, OperationKind};
pub use select::WeightedCursor;

/// The query router. `execute` is the sole entry point for callers; it
/// hides endpoint selection entirely.
pub struct Router {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
    pools: Arc<PoolManager>,
    circuits: Arc<CircuitRegistry>,
    cluster: Arc<ClusterState>,
    retry: RetryPolicy,
    cursor: WeightedCursor,
    config: RouterConfig,
}

impl Router {
    /// Assemble a router from configuration and a transport.
    ///
    /// Fails with `InvalidTopology` when the endpoint set does not hold
    /// exactly one primary.
    pub fn new(config: RouterConfig, connector: Arc<dyn Connector>) -> Result<Self, RouterError> {
        let registry = Arc::new(Registry::new(&config.endpoints)?);
        let pools = Arc::new(PoolManager::new(
            registry.clone(),
            connector.clone(),
            config.pool.clone(),
        ));
        Ok(Self {
            registry,
            connector,
            pools,
            circuits: Arc::new(CircuitRegistry::new(config.circuit.clone())),
            cluster: Arc::new(ClusterState::new()),
            retry: RetryPolicy::new(config.retries.clone()),
            cursor: WeightedCursor::new(),
            config,
        })
    }

    /// Spawn the background loops: health prober, failover coordinator and
    /// pool sweeper. Call once after construction.
    pub fn start(&self, shutdown: &Shutdown) {
        let prober = Arc::new(HealthProber::new(
            self.registry.clone(),
            self.connector.clone(),
            self.config.probe.clone(),
        ));
        tokio::spawn(prober.run(shutdown.sender()));

        let coordinator = FailoverCoordinator::new(
            self.registry.clone(),
            self.cluster.clone(),
            self.config.failover.clone(),
        );
        tokio::spawn(coordinator.run(shutdown.subscribe()));

        tokio::spawn(self.pools.clone().run_sweeper(shutdown.subscribe()));
    }

    /// Follow a topology file: reloads are validated and applied as a full
    /// endpoint replacement. The returned watcher must be kept alive for as
    /// long as the file should be followed.
    pub fn watch_topology(
        &self,
        path: &Path,
        shutdown: &Shutdown,
    ) -> Result<notify::RecommendedWatcher, notify::Error> {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        let handle = watcher.run()?;

        let registry = self.registry.clone();
        let mut rx = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(config) = update else { break };
                        match registry.apply_topology(TopologyUpdate::Replace(config.endpoints)) {
                            Ok(()) => tracing::info!("Reloaded topology applied"),
                            Err(e) => {
                                tracing::error!(error = %e, "Reloaded topology rejected, keeping current one");
                            }
                        }
                    }
                    _ = rx.recv() => break,
                }
            }
        });
        Ok(handle)
    }

    /// The registry, for administrative topology updates.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Shared failover state, for observability.
    pub fn cluster(&self) -> &Arc<ClusterState> {
        &self.cluster
    }

    /// Point-in-time observability snapshot.
    pub fn status(&self) -> StatusReport {
        StatusReport::collect(&self.registry, &self.circuits, &self.pools, &self.cluster)
    }

    /// Route and dispatch one operation.
    pub async fn execute(&self, operation: Operation) -> Result<Vec<u8>, RouterError> {
        let operation_id = Uuid::new_v4();
        let result = match operation.kind {
            OperationKind::Write => self.execute_write(&operation).await,
            OperationKind::Read => self.execute_read(&operation).await,
        };

        match &result {
            Ok(_) => metrics::record_operation(operation.kind.label(), "ok"),
            Err(e) => {
                metrics::record_operation(operation.kind.label(), e.outcome_label());
                tracing::debug!(
                    operation = %operation_id,
                    kind = operation.kind.label(),
                    error = %e,
                    "Operation failed"
                );
            }
        }
        result
    }

    async fn execute_write(&self, op: &Operation) -> Result<Vec<u8>, RouterError> {
        let mut attempt = 0u32;
        loop {
            let result = self.write_attempt(op).await;
            match result {
                Ok(resp) => {
                    self.cluster.record_write_ack();
                    return Ok(resp);
                }
                Err(e) => {
                    if !self.retry.should_retry(OperationKind::Write, &e, attempt)
                        || Instant::now() >= op.deadline
                    {
                        return Err(e);
                    }
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "Retrying write (command was never sent)");
                    time::sleep(self.retry.delay(attempt)).await;
                }
            }
        }
    }

    async fn write_attempt(&self, op: &Operation) -> Result<Vec<u8>, RouterError> {
        if self.cluster.is_failing_over() {
            return Err(RouterError::PrimaryUnavailable);
        }
        let snapshot = self.registry.snapshot();
        let primary = snapshot.primary();
        if primary.status == HealthStatus::Unreachable {
            // Fail fast; the coordinator owns what happens next.
            return Err(RouterError::PrimaryUnavailable);
        }
        self.dispatch(&primary.id, op).await
    }

    async fn execute_read(&self, op: &Operation) -> Result<Vec<u8>, RouterError> {
        let mut attempt = 0u32;
        let mut exclude: Option<EndpointId> = None;
        loop {
            let snapshot = self.registry.snapshot();
            let target = self.select_read_target(&snapshot, op, exclude.as_ref())?;
            match self.dispatch(&target, op).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if !self.retry.should_retry(OperationKind::Read, &e, attempt)
                        || Instant::now() >= op.deadline
                    {
                        return Err(e);
                    }
                    attempt += 1;
                    // Reselect, avoiding the endpoint that just failed when
                    // an alternative exists.
                    exclude = Some(target);
                    tracing::debug!(attempt, error = %e, "Retrying read on another endpoint");
                    time::sleep(self.retry.delay(attempt)).await;
                }
            }
        }
    }

    /// Pick the endpoint for a read under its consistency requirement.
    fn select_read_target(
        &self,
        snapshot: &Snapshot,
        op: &Operation,
        exclude: Option<&EndpointId>,
    ) -> Result<EndpointId, RouterError> {
        // Primary-only topologies serve reads from the primary; there is
        // nothing to split.
        if snapshot.replicas().next().is_none() {
            return Ok(snapshot.primary().id.clone());
        }

        let eligible: Vec<&EndpointState> = snapshot
            .replicas()
            .filter(|r| match op.consistency {
                Consistency::Eventual => matches!(
                    r.status,
                    HealthStatus::Healthy | HealthStatus::Unknown | HealthStatus::Degraded
                ),
                // Degraded replicas are excluded: they are known to lag.
                Consistency::ReadYourWrites { position } => {
                    matches!(r.status, HealthStatus::Healthy | HealthStatus::Unknown)
                        && r.position >= position
                }
            })
            .collect();

        if eligible.is_empty() {
            return match op.consistency {
                // Documented override of load spreading: the primary always
                // satisfies read-your-writes.
                Consistency::ReadYourWrites { .. } => Ok(snapshot.primary().id.clone()),
                Consistency::Eventual => Err(RouterError::NoEligibleEndpoint { kind: "read" }),
            };
        }

        // Skip the endpoint that just failed, if an alternative remains.
        let mut candidates: Vec<&EndpointState> = match exclude {
            Some(id) if eligible.len() > 1 => {
                eligible.iter().copied().filter(|e| &e.id != id).collect()
            }
            _ => eligible,
        };

        // Endpoints with a tripped circuit are transiently unavailable, not
        // ineligible; surface that distinction so callers can retry.
        let first = candidates[0].id.clone();
        candidates.retain(|e| self.circuits.breaker(&e.id).available());
        if candidates.is_empty() {
            return Err(RouterError::EndpointUnavailable {
                endpoint: first,
                reason: "circuit open".into(),
            });
        }

        Ok(self
            .cursor
            .pick(&candidates)
            .map(|e| e.id.clone())
            .unwrap_or(first))
    }

    /// One dispatch to one endpoint: circuit gate, lease, network call.
    async fn dispatch(&self, id: &EndpointId, op: &Operation) -> Result<Vec<u8>, RouterError> {
        let breaker = self.circuits.breaker(id);
        if !breaker.try_acquire() {
            return Err(RouterError::EndpointUnavailable {
                endpoint: id.clone(),
                reason: "circuit open".into(),
            });
        }

        let mut lease = match self.pools.acquire(id, op.deadline).await {
            Ok(lease) => lease,
            Err(e) => {
                // Capacity waits are congestion, not endpoint failure; only
                // unavailability feeds the breaker.
                if matches!(e, RouterError::EndpointUnavailable { .. }) {
                    breaker.record_failure();
                }
                return Err(e);
            }
        };

        let call = lease.connection().execute(&op.payload);
        match time::timeout_at(op.deadline.into(), call).await {
            Ok(Ok(response)) => {
                breaker.record_success();
                self.pools.release(lease);
                Ok(response)
            }
            Ok(Err(conn_err)) => {
                breaker.record_failure();
                self.pools.invalidate(lease);
                Err(self.classify_connection_error(id, op.kind, conn_err))
            }
            Err(_elapsed) => {
                breaker.record_failure();
                // The reply may still be in flight; the connection must not
                // be reused.
                self.pools.invalidate(lease);
                Err(match op.kind {
                    OperationKind::Write => RouterError::AmbiguousWriteOutcome {
                        endpoint: id.clone(),
                        reason: "deadline exceeded after send".into(),
                    },
                    OperationKind::Read => RouterError::Timeout { phase: "dispatch" },
                })
            }
        }
    }

    fn classify_connection_error(
        &self,
        id: &EndpointId,
        kind: OperationKind,
        error: ConnectionError,
    ) -> RouterError {
        match error {
            // Nothing reached the server; safe to retry even for writes.
            ConnectionError::Refused(reason) => RouterError::EndpointUnavailable {
                endpoint: id.clone(),
                reason,
            },
            ConnectionError::Broken(reason) => match kind {
                OperationKind::Write => RouterError::AmbiguousWriteOutcome {
                    endpoint: id.clone(),
                    reason,
                },
                OperationKind::Read => RouterError::EndpointUnavailable {
                    endpoint: id.clone(),
                    reason,
                },
            },
            // The server answered with a definite failure.
            ConnectionError::Rejected(reason) => RouterError::Connection {
                endpoint: id.clone(),
                reason,
            },
        }
    }
}
