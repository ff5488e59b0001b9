//! Active health probing.
//!
//! # Responsibilities
//! - Probe every endpoint on a fixed interval (connect + ping, and a lag
//!   measurement for replicas)
//! - Classify endpoints healthy / degraded / unreachable with hysteresis
//! - Feed observations into the registry
//!
//! One task per endpoint: a slow or hung node must never delay probes of
//! the others. A supervisor loop reconciles tasks with the topology so
//! endpoints added or removed at runtime are picked up.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::ProbeConfig;
use crate::observability::metrics;
use crate::pool::{ConnectionError, Connector, ReplicationStatus};
use crate::registry::{EndpointId, HealthStatus, Registry, Role};

pub struct HealthProber {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
    config: ProbeConfig,
    running: DashMap<EndpointId, ()>,
}

impl HealthProber {
    pub fn new(registry: Arc<Registry>, connector: Arc<dyn Connector>, config: ProbeConfig) -> Self {
        Self {
            registry,
            connector,
            config,
            running: DashMap::new(),
        }
    }

    /// Supervisor loop: spawns a probe task per endpoint and keeps the task
    /// set in sync with the topology.
    pub async fn run(self: Arc<Self>, shutdown: broadcast::Sender<()>) {
        tracing::info!(
            interval_ms = self.config.probe_interval_ms,
            lag_threshold_ms = self.config.lag_threshold_ms,
            "Health prober starting"
        );

        let mut rx = shutdown.subscribe();
        let mut ticker = time::interval(Duration::from_millis(self.config.probe_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::reconcile(&self, &shutdown);
                }
                _ = rx.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn reconcile(prober: &Arc<Self>, shutdown: &broadcast::Sender<()>) {
        let snapshot = prober.registry.snapshot();
        for endpoint in snapshot.endpoints() {
            if prober.running.contains_key(&endpoint.id) {
                continue;
            }
            prober.running.insert(endpoint.id.clone(), ());
            let prober = Arc::clone(prober);
            let id = endpoint.id.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                prober.probe_loop(id, rx).await;
            });
        }
    }

    /// Probe one endpoint until it disappears from the topology or shutdown.
    async fn probe_loop(self: Arc<Self>, id: EndpointId, mut shutdown: broadcast::Receiver<()>) {
        let mut failures = 0u32;
        let mut successes = 0u32;
        let mut ticker = time::interval(Duration::from_millis(self.config.probe_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.registry.snapshot().get(&id).is_none() {
                        tracing::debug!(endpoint = %id, "Endpoint left topology, stopping probe task");
                        break;
                    }
                    self.probe_once(&id, &mut failures, &mut successes).await;
                }
                _ = shutdown.recv() => break,
            }
        }
        self.running.remove(&id);
    }

    async fn probe_once(&self, id: &EndpointId, failures: &mut u32, successes: &mut u32) {
        let snapshot = self.registry.snapshot();
        let Some(endpoint) = snapshot.get(id) else {
            return;
        };

        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let probe = self.probe_round_trip(&endpoint.address);
        let outcome = match time::timeout(timeout, probe).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => {
                tracing::debug!(endpoint = %id, error = %e, "Probe failed");
                Err(())
            }
            Err(_) => {
                tracing::debug!(endpoint = %id, "Probe timed out");
                Err(())
            }
        };

        match outcome {
            Ok(status) => {
                *failures = 0;
                *successes += 1;

                if let Err(e) = self.registry.record_position(id, status.position, status.lag) {
                    tracing::debug!(endpoint = %id, error = %e, "Position update dropped");
                    return;
                }

                // An unreachable endpoint must earn its way back with
                // consecutive successes, otherwise a single lucky probe
                // would flap it straight into rotation.
                if endpoint.status == HealthStatus::Unreachable
                    && *successes < self.config.healthy_after_successes
                {
                    return;
                }

                let lagging = endpoint.role == Role::Replica
                    && status.lag > Duration::from_millis(self.config.lag_threshold_ms);
                let new_status = if lagging {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };

                if endpoint.status != new_status {
                    tracing::info!(
                        endpoint = %id,
                        from = ?endpoint.status,
                        to = ?new_status,
                        lag_ms = status.lag.as_millis() as u64,
                        "Endpoint health changed"
                    );
                    let _ = self.registry.update_health(id, new_status);
                }
                metrics::record_endpoint_health(id.as_str(), new_status);
            }
            Err(()) => {
                *successes = 0;
                *failures += 1;

                if *failures >= self.config.unreachable_after_failures
                    && endpoint.status != HealthStatus::Unreachable
                {
                    tracing::warn!(
                        endpoint = %id,
                        failures = *failures,
                        "Endpoint marked unreachable"
                    );
                    let _ = self.registry.update_health(id, HealthStatus::Unreachable);
                    metrics::record_endpoint_health(id.as_str(), HealthStatus::Unreachable);
                }
            }
        }
    }

    /// One liveness round trip: connect, ping, read replication state.
    async fn probe_round_trip(&self, address: &str) -> Result<ReplicationStatus, ConnectionError> {
        let mut conn = self.connector.connect(address).await?;
        conn.ping().await?;
        conn.replication_status().await
    }
}
