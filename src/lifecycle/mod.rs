//! Lifecycle management.
//!
//! The router runs three background loops (health prober, failover
//! coordinator, pool sweeper); this module coordinates stopping them.

pub mod shutdown;

pub use shutdown::Shutdown;
