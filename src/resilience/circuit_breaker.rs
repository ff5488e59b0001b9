//! Circuit breaker for endpoint protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: endpoint assumed down, calls fail fast
//! - Half-Open: one trial call allowed to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after cooldown (grows with each reopen)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-endpoint breaker (not global); kept in a DashMap so a tripped
//!   replica never affects routing to the others
//! - State and counters are atomics; no lock on the hot path
//! - Single probe in Half-Open (prevents hammering a recovering endpoint)

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::CircuitConfig;
use crate::observability::metrics;
use crate::registry::EndpointId;
use crate::resilience::backoff::calculate_backoff;

/// Observable breaker state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-endpoint circuit breaker.
pub struct CircuitBreaker {
    endpoint: EndpointId,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    /// Unix millis of the last transition to Open.
    opened_at_ms: AtomicU64,
    /// Consecutive reopens; drives cooldown backoff.
    open_streak: AtomicU32,
    config: CircuitConfig,
}

impl CircuitBreaker {
    pub fn new(endpoint: EndpointId, config: CircuitConfig) -> Self {
        Self {
            endpoint,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            open_streak: AtomicU32::new(0),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Relaxed).into()
    }

    /// Non-consuming availability check for endpoint selection: closed, or
    /// open with the cooldown elapsed (a dispatch may then win the
    /// half-open trial). Half-open itself is busy with its single trial.
    pub fn available(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let streak = self.open_streak.load(Ordering::Relaxed);
                let cooldown = calculate_backoff(
                    streak.max(1),
                    self.config.circuit_open_cooldown_ms,
                    self.config.max_cooldown_ms,
                );
                let opened_at = self.opened_at_ms.load(Ordering::Relaxed);
                now_ms().saturating_sub(opened_at) >= cooldown.as_millis() as u64
            }
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// In Open state this admits exactly one caller once the cooldown has
    /// elapsed, moving the breaker to Half-Open; everyone else fails fast.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let streak = self.open_streak.load(Ordering::Relaxed);
                let cooldown = calculate_backoff(
                    streak.max(1),
                    self.config.circuit_open_cooldown_ms,
                    self.config.max_cooldown_ms,
                );
                let opened_at = self.opened_at_ms.load(Ordering::Relaxed);
                if now_ms().saturating_sub(opened_at) < cooldown.as_millis() as u64 {
                    return false;
                }
                // CAS so only one caller wins the half-open trial.
                let won = self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok();
                if won {
                    tracing::info!(endpoint = %self.endpoint, "Circuit half-open, allowing trial call");
                    metrics::record_circuit_state(self.endpoint.as_str(), CircuitState::HalfOpen);
                }
                won
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let prev = self
            .state
            .swap(CircuitState::Closed as u8, Ordering::AcqRel);
        if prev != CircuitState::Closed as u8 {
            self.open_streak.store(0, Ordering::Relaxed);
            tracing::info!(endpoint = %self.endpoint, "Circuit closed");
            metrics::record_circuit_state(self.endpoint.as_str(), CircuitState::Closed);
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => self.reopen("trial call failed"),
            CircuitState::Open => {}
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.reopen("failure threshold reached");
                }
            }
        }
    }

    fn reopen(&self, reason: &str) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.opened_at_ms.store(now_ms(), Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let streak = self.open_streak.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(endpoint = %self.endpoint, streak, reason, "Circuit opened");
        metrics::record_circuit_state(self.endpoint.as_str(), CircuitState::Open);
    }

    #[cfg(test)]
    fn force_cooldown_elapsed(&self) {
        self.opened_at_ms.store(0, Ordering::Relaxed);
    }
}

/// Breakers for every endpoint, created lazily.
pub struct CircuitRegistry {
    breakers: DashMap<EndpointId, Arc<CircuitBreaker>>,
    config: CircuitConfig,
}

impl CircuitRegistry {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    pub fn breaker(&self, id: &EndpointId) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(id.clone(), self.config.clone())))
            .clone()
    }

    pub fn state(&self, id: &EndpointId) -> CircuitState {
        self.breakers
            .get(id)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            EndpointId::from("r1"),
            CircuitConfig {
                failure_threshold: 5,
                circuit_open_cooldown_ms: 5_000,
                max_cooldown_ms: 60_000,
            },
        )
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire(), "open circuit must fail fast");
    }

    #[test]
    fn single_half_open_trial_after_cooldown() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        cb.force_cooldown_elapsed();

        assert!(cb.try_acquire(), "first caller wins the trial");
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.try_acquire(), "second caller is rejected");
    }

    #[test]
    fn trial_success_closes_trial_failure_reopens() {
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        cb.force_cooldown_elapsed();
        assert!(cb.try_acquire());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire());

        for _ in 0..5 {
            cb.record_failure();
        }
        cb.force_cooldown_elapsed();
        assert!(cb.try_acquire());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
