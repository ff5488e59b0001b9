//! Failover coordination.
//!
//! # State Machine
//! ```text
//! Stable → FailingOver:
//!     primary unreachable AND no write acknowledged within the grace window
//! FailingOver → Stable:
//!     reachable replica with the highest applied position promoted
//!     (or the primary recovers before any promotion happened)
//! ```
//!
//! # Design Decisions
//! - While failing over, writes are rejected with `PrimaryUnavailable`,
//!   never queued; callers must retry
//! - The candidate with the highest applied position wins, minimizing lost
//!   replication
//! - A demoted primary that recovers rejoins as a replica only; regaining
//!   the primary role takes an explicit operator promote. Fencing the old
//!   node is the orchestrator's job

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::time;

use crate::config::FailoverConfig;
use crate::observability::metrics;
use crate::registry::{HealthStatus, Registry};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cluster-wide failover state shared between the coordinator and the
/// router's write path.
pub struct ClusterState {
    failing_over: AtomicBool,
    /// Unix millis of the last acknowledged write. Seeded at startup so a
    /// fresh router cannot trip a failover before its first grace window.
    last_write_ack_ms: AtomicU64,
}

impl ClusterState {
    pub fn new() -> Self {
        Self {
            failing_over: AtomicBool::new(false),
            last_write_ack_ms: AtomicU64::new(now_ms()),
        }
    }

    pub fn is_failing_over(&self) -> bool {
        self.failing_over.load(Ordering::Relaxed)
    }

    /// Called by the router after every successful write.
    pub fn record_write_ack(&self) {
        self.last_write_ack_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn since_last_write_ack(&self) -> Duration {
        let last = self.last_write_ack_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms().saturating_sub(last))
    }

    fn set_failing_over(&self, value: bool) {
        self.failing_over.store(value, Ordering::Relaxed);
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects primary loss and drives the promotion.
pub struct FailoverCoordinator {
    registry: Arc<Registry>,
    cluster: Arc<ClusterState>,
    config: FailoverConfig,
}

impl FailoverCoordinator {
    pub fn new(registry: Arc<Registry>, cluster: Arc<ClusterState>, config: FailoverConfig) -> Self {
        Self {
            registry,
            cluster,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            check_interval_ms = self.config.check_interval_ms,
            write_grace_ms = self.config.write_grace_ms,
            "Failover coordinator starting"
        );

        let mut ticker = time::interval(Duration::from_millis(self.config.check_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evaluate();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Failover coordinator received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One evaluation of the state machine. Exposed for tests; the run loop
    /// calls this on every tick.
    pub fn evaluate(&self) {
        let snapshot = self.registry.snapshot();
        let primary = snapshot.primary();

        if !self.cluster.is_failing_over() {
            let primary_down = primary.status == HealthStatus::Unreachable;
            let grace = Duration::from_millis(self.config.write_grace_ms);
            if primary_down && self.cluster.since_last_write_ack() >= grace {
                tracing::error!(
                    primary = %primary.id,
                    since_last_write_ms = self.cluster.since_last_write_ack().as_millis() as u64,
                    "Primary unreachable past grace window, entering failover"
                );
                self.cluster.set_failing_over(true);
            } else {
                return;
            }
        }

        // The primary recovered before any promotion happened; the role
        // never changed, so resuming it is safe.
        if primary.status != HealthStatus::Unreachable {
            tracing::warn!(primary = %primary.id, "Primary recovered before promotion, resuming");
            self.cluster.set_failing_over(false);
            return;
        }

        let candidate = snapshot
            .replicas()
            .filter(|r| r.status.is_reachable())
            .max_by_key(|r| r.position);

        let Some(candidate) = candidate else {
            tracing::error!("No reachable replica to promote, writes remain rejected");
            return;
        };

        match self.registry.promote(&candidate.id) {
            Ok(()) => {
                tracing::warn!(
                    new_primary = %candidate.id,
                    position = candidate.position,
                    "Failover complete"
                );
                metrics::record_failover(candidate.id.as_str());
                // Fresh grace window for the new primary.
                self.cluster.record_write_ack();
                self.cluster.set_failing_over(false);
            }
            Err(e) => {
                tracing::error!(candidate = %candidate.id, error = %e, "Promotion failed");
            }
        }
    }
}
