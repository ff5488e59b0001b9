//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Router picks endpoint
//!     → manager.rs acquire(endpoint, deadline)
//!         → unreachable endpoint: fail fast
//!         → fresh idle connection: reuse
//!         → otherwise: connector dials a new one (bounded by deadline)
//!     → Lease handed to the dispatch path
//!     → drop returns it, invalidate discards it
//! ```
//!
//! # Design Decisions
//! - One pool per endpoint; no lock spans endpoints
//! - The pool owns connection lifetimes, callers only ever hold a Lease
//! - Cancelled operations invalidate their connection so a late reply can
//!   never leak into another caller
//! - The transport is a trait seam (connection.rs); the router stays
//!   wire-protocol-agnostic

pub mod connection;
pub mod manager;

pub use connection::{Connection, ConnectionError, Connector, ReplicationStatus};
pub use manager::{Lease, PoolManager, PoolUtilization};
