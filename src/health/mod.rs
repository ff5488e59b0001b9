//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! prober.rs, one task per endpoint:
//!     Periodic timer
//!     → connect + ping (+ replication lag for replicas), probe timeout
//!     → K consecutive failures  → registry: unreachable
//!     → N consecutive successes → registry: healthy / degraded by lag
//! ```
//!
//! # Design Decisions
//! - Probes for different endpoints never block on each other
//! - Consecutive-failure and consecutive-success thresholds prevent
//!   flapping on transient blips
//! - Degraded (reachable but lagging) stays eligible for eventual reads

pub mod prober;

pub use prober::HealthProber;
