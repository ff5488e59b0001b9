//! Shared mock database fabric for integration tests.
//!
//! Each address maps to a scripted node whose reachability, replication
//! state and failure mode can be flipped mid-test. Successful executes
//! answer with the node's address so tests can see who served a call.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use db_router::config::{
    CircuitConfig, EndpointConfig, FailoverConfig, PoolConfig, ProbeConfig, RetryConfig,
    RoleConfig, RouterConfig,
};
use db_router::{Connection, ConnectionError, Connector, ReplicationStatus};

/// Failure script for a node's execute path.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Answer normally.
    None = 0,
    /// Refuse before anything is sent.
    Refused = 1,
    /// Break after the command was sent (ambiguous for writes).
    Broken = 2,
    /// Never answer; the caller's deadline fires.
    Hang = 3,
}

impl From<u8> for FailureMode {
    fn from(val: u8) -> Self {
        match val {
            1 => FailureMode::Refused,
            2 => FailureMode::Broken,
            3 => FailureMode::Hang,
            _ => FailureMode::None,
        }
    }
}

pub struct MockNode {
    pub address: String,
    reachable: AtomicBool,
    position: AtomicU64,
    lag_ms: AtomicU64,
    mode: AtomicU8,
    /// Commands that reached the execute path.
    pub executed: AtomicUsize,
    /// Dial attempts, probes included.
    pub connects: AtomicUsize,
}

impl MockNode {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            reachable: AtomicBool::new(true),
            position: AtomicU64::new(0),
            lag_ms: AtomicU64::new(0),
            mode: AtomicU8::new(FailureMode::None as u8),
            executed: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::SeqCst);
    }

    pub fn set_lag(&self, lag: Duration) {
        self.lag_ms.store(lag.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_mode(&self, mode: FailureMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// Connector over the scripted fabric. Nodes are created on first dial.
#[derive(Default)]
pub struct MockConnector {
    nodes: DashMap<String, Arc<MockNode>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn node(&self, address: &str) -> Arc<MockNode> {
        self.nodes
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(MockNode::new(address)))
            .clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>, ConnectionError> {
        let node = self.node(address);
        node.connects.fetch_add(1, Ordering::SeqCst);
        if !node.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Refused(format!("{address} is down")));
        }
        Ok(Box::new(MockConnection { node }))
    }
}

pub struct MockConnection {
    node: Arc<MockNode>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, _payload: &[u8]) -> Result<Vec<u8>, ConnectionError> {
        if !self.node.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Refused(format!(
                "{} is down",
                self.node.address
            )));
        }
        match FailureMode::from(self.node.mode.load(Ordering::SeqCst)) {
            FailureMode::Refused => Err(ConnectionError::Refused(format!(
                "{} refused",
                self.node.address
            ))),
            FailureMode::Broken => {
                self.node.executed.fetch_add(1, Ordering::SeqCst);
                Err(ConnectionError::Broken(format!(
                    "{} dropped mid-command",
                    self.node.address
                )))
            }
            FailureMode::Hang => {
                self.node.executed.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(600)).await;
                Err(ConnectionError::Broken("unreachable".into()))
            }
            FailureMode::None => {
                self.node.executed.fetch_add(1, Ordering::SeqCst);
                Ok(self.node.address.clone().into_bytes())
            }
        }
    }

    async fn ping(&mut self) -> Result<(), ConnectionError> {
        if self.node.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::Refused(format!(
                "{} is down",
                self.node.address
            )))
        }
    }

    async fn replication_status(&mut self) -> Result<ReplicationStatus, ConnectionError> {
        Ok(ReplicationStatus {
            position: self.node.position.load(Ordering::SeqCst),
            lag: Duration::from_millis(self.node.lag_ms.load(Ordering::SeqCst)),
        })
    }
}

fn endpoint(name: &str, role: RoleConfig) -> EndpointConfig {
    EndpointConfig {
        name: name.to_string(),
        address: format!("{name}.db:5432"),
        role,
        weight: 1,
    }
}

/// One primary, two replicas, timings tightened for tests.
pub fn three_node_config() -> RouterConfig {
    RouterConfig {
        endpoints: vec![
            endpoint("p1", RoleConfig::Primary),
            endpoint("r1", RoleConfig::Replica),
            endpoint("r2", RoleConfig::Replica),
        ],
        probe: ProbeConfig {
            probe_interval_ms: 10,
            probe_timeout_ms: 50,
            lag_threshold_ms: 100,
            unreachable_after_failures: 3,
            healthy_after_successes: 2,
        },
        pool: PoolConfig {
            pool_min: 0,
            pool_max: 8,
            max_idle_age_ms: 60_000,
            sweep_interval_ms: 60_000,
        },
        retries: RetryConfig {
            retry_limit_reads: 2,
            retry_limit_writes: 1,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        circuit: CircuitConfig {
            failure_threshold: 5,
            circuit_open_cooldown_ms: 10_000,
            max_cooldown_ms: 10_000,
        },
        failover: FailoverConfig {
            check_interval_ms: 10,
            write_grace_ms: 0,
        },
    }
}

/// Pre-create the fabric nodes for a config so tests can script them
/// before the router dials anything.
pub fn nodes_for(connector: &MockConnector, config: &RouterConfig) -> Vec<Arc<MockNode>> {
    config
        .endpoints
        .iter()
        .map(|e| connector.node(&e.address))
        .collect()
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_for(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}
