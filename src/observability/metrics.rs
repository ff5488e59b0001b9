//! Metrics collection.
//!
//! # Responsibilities
//! - Define router metrics (operations, health, circuits, pools, failovers)
//! - Low-overhead updates on the hot path
//!
//! # Metrics
//! - `router_operations_total` (counter): operations by kind, outcome
//! - `router_endpoint_health` (gauge): 0=unreachable, 1=degraded, 2=healthy
//! - `router_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `router_pool_in_use` / `router_pool_idle` (gauges): per endpoint
//! - `router_failover_total` (counter): completed promotions
//!
//! Exposition (Prometheus endpoint or otherwise) belongs to the embedding
//! application; this crate only emits through the `metrics` facade.

use metrics::{counter, gauge};

use crate::registry::HealthStatus;
use crate::resilience::CircuitState;

/// Record the outcome of one routed operation.
pub fn record_operation(kind: &'static str, outcome: &'static str) {
    counter!("router_operations_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record an endpoint's health classification.
pub fn record_endpoint_health(endpoint: &str, status: HealthStatus) {
    let value = match status {
        HealthStatus::Unreachable => 0.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Healthy | HealthStatus::Unknown => 2.0,
    };
    gauge!("router_endpoint_health", "endpoint" => endpoint.to_string()).set(value);
}

/// Record an endpoint's circuit breaker state.
pub fn record_circuit_state(endpoint: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("router_circuit_state", "endpoint" => endpoint.to_string()).set(value);
}

/// Record pool utilization for one endpoint.
pub fn record_pool_utilization(endpoint: &str, in_use: usize, idle: usize) {
    gauge!("router_pool_in_use", "endpoint" => endpoint.to_string()).set(in_use as f64);
    gauge!("router_pool_idle", "endpoint" => endpoint.to_string()).set(idle as f64);
}

/// Record a completed failover promotion.
pub fn record_failover(new_primary: &str) {
    counter!("router_failover_total", "new_primary" => new_primary.to_string()).increment(1);
}
