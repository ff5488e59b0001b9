//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the query router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Database endpoint definitions (one primary, N replicas).
    pub endpoints: Vec<EndpointConfig>,

    /// Health probing settings.
    pub probe: ProbeConfig,

    /// Per-endpoint connection pool settings.
    pub pool: PoolConfig,

    /// Retry policy settings.
    pub retries: RetryConfig,

    /// Circuit breaker settings.
    pub circuit: CircuitConfig,

    /// Failover coordinator settings.
    pub failover: FailoverConfig,
}

/// Declared role of an endpoint in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleConfig {
    Primary,
    Replica,
}

/// A single database endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Unique endpoint identifier.
    pub name: String,

    /// Dial address (e.g., "10.0.3.17:5432").
    pub address: String,

    /// Declared role at startup.
    pub role: RoleConfig,

    /// Relative selection weight for read balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Health probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe cycle interval in milliseconds.
    pub probe_interval_ms: u64,

    /// Per-probe timeout in milliseconds. A probe exceeding this counts as
    /// a failure.
    pub probe_timeout_ms: u64,

    /// Replication lag above this threshold marks a replica degraded.
    pub lag_threshold_ms: u64,

    /// Consecutive probe failures before an endpoint is marked unreachable.
    pub unreachable_after_failures: u32,

    /// Consecutive probe successes before an unreachable endpoint is
    /// readmitted.
    pub healthy_after_successes: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1_000,
            probe_timeout_ms: 500,
            lag_threshold_ms: 5_000,
            unreachable_after_failures: 3,
            healthy_after_successes: 2,
        }
    }
}

/// Connection pool configuration, applied per endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum connections the pool keeps warm.
    pub pool_min: usize,

    /// Maximum concurrent connections per endpoint.
    pub pool_max: usize,

    /// Idle connections older than this are recycled.
    pub max_idle_age_ms: u64,

    /// How often the idle sweeper runs.
    pub sweep_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_min: 1,
            pool_max: 16,
            max_idle_age_ms: 60_000,
            sweep_interval_ms: 10_000,
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retries for idempotent reads.
    pub retry_limit_reads: u32,

    /// Maximum retries for writes that failed before the command was sent.
    pub retry_limit_writes: u32,

    /// Base delay for retry backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit_reads: 2,
            retry_limit_writes: 1,
            base_delay_ms: 25,
            max_delay_ms: 500,
        }
    }
}

/// Circuit breaker configuration, applied per endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Cooldown before a half-open trial is allowed, in milliseconds.
    pub circuit_open_cooldown_ms: u64,

    /// Cap on the cooldown after repeated reopens, in milliseconds.
    pub max_cooldown_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            circuit_open_cooldown_ms: 5_000,
            max_cooldown_ms: 60_000,
        }
    }
}

/// Failover coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// How often the coordinator evaluates the primary.
    pub check_interval_ms: u64,

    /// A failover starts only if no write succeeded within this window while
    /// the primary is unreachable.
    pub write_grace_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1_000,
            write_grace_ms: 3_000,
        }
    }
}
