//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch to endpoint:
//!     → circuit_breaker.rs (fail fast if the endpoint's circuit is open)
//!     → network call bounded by the operation deadline
//!     → on failure: retry.rs (classify, reselect endpoint, backoff.rs delay)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline; timeouts are non-negotiable
//! - Retries only where the outcome is known safe (reads, not-sent writes)
//! - Circuit breaker prevents cascading failures, one breaker per endpoint

pub mod backoff;
pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitRegistry, CircuitState};
pub use retry::RetryPolicy;
