//! Read/write-splitting query router.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                   QUERY ROUTER                    │
//!                    │                                                   │
//!   execute(op) ─────┼─▶ router ──▶ registry snapshot ──▶ selection      │
//!                    │      │                                │           │
//!                    │      │         ┌──────────────────────┘           │
//!                    │      ▼         ▼                                  │
//!                    │  resilience (circuit / retry)                     │
//!                    │      │                                            │
//!                    │      ▼                                            │
//!   result ◀─────────┼── pool (lease) ──▶ database endpoint              │
//!                    │                                                   │
//!                    │  background: health prober ─▶ registry            │
//!                    │              failover coordinator ─▶ registry     │
//!                    │              pool sweeper                         │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! Callers submit tagged operations through [`router::Router::execute`] and
//! never learn which physical node answered. The prober and the failover
//! coordinator mutate the registry; the router only ever reads immutable
//! snapshots of it.

// Core subsystems
pub mod config;
pub mod error;
pub mod registry;
pub mod router;

// Traffic management
pub mod failover;
pub mod health;
pub mod pool;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::RouterConfig;
pub use error::RouterError;
pub use lifecycle::Shutdown;
pub use pool::{Connection, ConnectionError, Connector, ReplicationStatus};
pub use router::{Consistency, Operation, OperationKind, Router};
