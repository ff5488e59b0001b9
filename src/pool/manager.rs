//! Per-endpoint connection pools.
//!
//! # Responsibilities
//! - One bounded pool per endpoint (pool_min..pool_max)
//! - Deadline-bounded acquisition; the only intended blocking point
//!   besides the network call itself
//! - Fast-fail acquisition for unreachable endpoints
//! - Recycle idle connections past their max idle age

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;

use crate::config::PoolConfig;
use crate::error::RouterError;
use crate::observability::metrics;
use crate::pool::connection::{Connection, Connector};
use crate::registry::{EndpointId, HealthStatus, Registry};

struct IdleConn {
    conn: Box<dyn Connection>,
    idle_since: Instant,
}

struct PoolInner {
    endpoint: EndpointId,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConn>>,
    /// Live connections, idle plus leased.
    total: AtomicUsize,
}

impl PoolInner {
    fn idle_len(&self) -> usize {
        self.idle.lock().expect("pool idle lock poisoned").len()
    }
}

/// A borrowed physical connection bound to one endpoint.
///
/// Owned exclusively by the borrowing operation. Dropping the lease returns
/// the connection to the pool; [`Lease::invalidate`] discards it instead.
pub struct Lease {
    conn: Option<Box<dyn Connection>>,
    /// Set once the connection has been handed out for a call and cleared
    /// only by a clean release. A lease dropped while this is set (the
    /// caller cancelled mid-call) discards the connection.
    in_flight: bool,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn endpoint(&self) -> &EndpointId {
        &self.pool.endpoint
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        self.in_flight = true;
        self.conn
            .as_mut()
            .expect("lease connection taken")
            .as_mut()
    }

    /// Discard the underlying connection instead of returning it. Used when
    /// the connection is broken or a reply may still be in flight after a
    /// cancellation.
    pub fn invalidate(mut self) {
        if self.conn.take().is_some() {
            self.pool.total.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(endpoint = %self.pool.endpoint, "Connection invalidated");
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.in_flight {
            // A command may still be running on this connection; its late
            // reply must never reach another caller.
            self.pool.total.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(
                endpoint = %self.pool.endpoint,
                "Lease dropped mid-call, discarding connection"
            );
        } else {
            self.pool
                .idle
                .lock()
                .expect("pool idle lock poisoned")
                .push_back(IdleConn {
                    conn,
                    idle_since: Instant::now(),
                });
        }
        // The permit drops after this, releasing pool capacity.
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("endpoint", &self.pool.endpoint)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

/// Point-in-time pool utilization for one endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolUtilization {
    pub in_use: usize,
    pub idle: usize,
    pub max: usize,
}

/// Owns every endpoint's pool and the connector used to grow them.
pub struct PoolManager {
    registry: Arc<Registry>,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    pools: DashMap<EndpointId, Arc<PoolInner>>,
}

impl PoolManager {
    pub fn new(registry: Arc<Registry>, connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self {
            registry,
            connector,
            config,
            pools: DashMap::new(),
        }
    }

    /// Borrow a connection to `id`, waiting no later than `deadline`.
    ///
    /// Unreachable endpoints fail immediately with `EndpointUnavailable`
    /// rather than waiting on a dead socket.
    pub async fn acquire(&self, id: &EndpointId, deadline: Instant) -> Result<Lease, RouterError> {
        let snapshot = self.registry.snapshot();
        let endpoint = snapshot
            .get(id)
            .ok_or_else(|| RouterError::UnknownEndpoint(id.clone()))?;

        if endpoint.status == HealthStatus::Unreachable {
            return Err(RouterError::EndpointUnavailable {
                endpoint: id.clone(),
                reason: "endpoint unreachable".into(),
            });
        }

        let pool = self.pool_for(id);

        let permit = time::timeout_at(deadline.into(), pool.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| RouterError::Timeout {
                phase: "pool acquire",
            })?
            .map_err(|_| RouterError::EndpointUnavailable {
                endpoint: id.clone(),
                reason: "pool closed".into(),
            })?;

        let max_idle_age = Duration::from_millis(self.config.max_idle_age_ms);
        let conn = loop {
            let candidate = pool
                .idle
                .lock()
                .expect("pool idle lock poisoned")
                .pop_front();
            match candidate {
                Some(idle) if idle.idle_since.elapsed() <= max_idle_age => break Some(idle.conn),
                Some(_stale) => {
                    pool.total.fetch_sub(1, Ordering::Relaxed);
                }
                None => break None,
            }
        };

        let conn = match conn {
            Some(conn) => conn,
            None => {
                let connected =
                    time::timeout_at(deadline.into(), self.connector.connect(&endpoint.address))
                        .await
                        .map_err(|_| RouterError::Timeout { phase: "connect" })?;
                match connected {
                    Ok(conn) => {
                        pool.total.fetch_add(1, Ordering::Relaxed);
                        conn
                    }
                    Err(e) => return Err(e.into_unavailable(id)),
                }
            }
        };

        self.record_utilization(id, &pool);
        Ok(Lease {
            conn: Some(conn),
            in_flight: false,
            pool,
            _permit: permit,
        })
    }

    /// Return a lease to its pool after a completed call.
    pub fn release(&self, mut lease: Lease) {
        let id = lease.endpoint().clone();
        let pool = lease.pool.clone();
        lease.in_flight = false;
        drop(lease);
        self.record_utilization(&id, &pool);
    }

    /// Discard a broken lease; the pool grows a replacement on demand.
    pub fn invalidate(&self, lease: Lease) {
        let id = lease.endpoint().clone();
        let pool = lease.pool.clone();
        lease.invalidate();
        self.record_utilization(&id, &pool);
    }

    /// Current utilization of one endpoint's pool.
    pub fn utilization(&self, id: &EndpointId) -> PoolUtilization {
        match self.pools.get(id) {
            Some(pool) => {
                let idle = pool.idle_len();
                let total = pool.total.load(Ordering::Relaxed);
                PoolUtilization {
                    in_use: total.saturating_sub(idle),
                    idle,
                    max: self.config.pool_max,
                }
            }
            None => PoolUtilization {
                in_use: 0,
                idle: 0,
                max: self.config.pool_max,
            },
        }
    }

    /// Background sweeper: recycles idle connections past their max idle
    /// age and keeps reachable pools warmed to `pool_min`.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(Duration::from_millis(self.config.sweep_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Pool sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn sweep(&self) {
        let snapshot = self.registry.snapshot();
        let max_idle_age = Duration::from_millis(self.config.max_idle_age_ms);

        for endpoint in snapshot.endpoints() {
            let pool = self.pool_for(&endpoint.id);

            let mut recycled = 0usize;
            {
                let mut idle = pool.idle.lock().expect("pool idle lock poisoned");
                while let Some(front) = idle.front() {
                    if front.idle_since.elapsed() > max_idle_age {
                        idle.pop_front();
                        pool.total.fetch_sub(1, Ordering::Relaxed);
                        recycled += 1;
                    } else {
                        break;
                    }
                }
            }
            if recycled > 0 {
                tracing::debug!(endpoint = %endpoint.id, recycled, "Recycled idle connections");
            }

            // Warm reachable pools back up to the configured minimum.
            if endpoint.status.is_reachable() {
                while pool.total.load(Ordering::Relaxed) < self.config.pool_min {
                    let connect = self.connector.connect(&endpoint.address);
                    let bound =
                        Duration::from_millis(self.config.sweep_interval_ms);
                    match time::timeout(bound, connect).await {
                        Ok(Ok(conn)) => {
                            pool.total.fetch_add(1, Ordering::Relaxed);
                            pool.idle
                                .lock()
                                .expect("pool idle lock poisoned")
                                .push_back(IdleConn {
                                    conn,
                                    idle_since: Instant::now(),
                                });
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(endpoint = %endpoint.id, error = %e, "Pool warm-up connect failed");
                            break;
                        }
                        Err(_) => {
                            tracing::debug!(endpoint = %endpoint.id, "Pool warm-up connect timed out");
                            break;
                        }
                    }
                }
            }

            self.record_utilization(&endpoint.id, &pool);
        }

        // Drop pools for endpoints removed from the topology.
        self.pools
            .retain(|id, _| snapshot.get(id).is_some());
    }

    fn pool_for(&self, id: &EndpointId) -> Arc<PoolInner> {
        self.pools
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(PoolInner {
                    endpoint: id.clone(),
                    semaphore: Arc::new(Semaphore::new(self.config.pool_max)),
                    idle: Mutex::new(VecDeque::new()),
                    total: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    fn record_utilization(&self, id: &EndpointId, pool: &PoolInner) {
        let idle = pool.idle_len();
        let total = pool.total.load(Ordering::Relaxed);
        metrics::record_pool_utilization(id.as_str(), total.saturating_sub(idle), idle);
    }
}
