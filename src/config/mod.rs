//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file → loader.rs (parse) → validation.rs (topology checks)
//!     → schema.rs types consumed at startup
//! watcher.rs: file change → reload → mpsc → registry admin path
//! ```
//!
//! # Design Decisions
//! - Every tuning knob lives in config, never in code (probe thresholds,
//!   pool bounds, retry limits, circuit cooldowns are workload-dependent)
//! - Invalid reloads are rejected and the last good config stays in effect
//! - Exactly-one-primary is enforced at load time

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CircuitConfig, EndpointConfig, FailoverConfig, PoolConfig, ProbeConfig, RetryConfig,
    RoleConfig, RouterConfig,
};
pub use watcher::ConfigWatcher;
