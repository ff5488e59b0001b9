//! Observability subsystem.
//!
//! # Responsibilities
//! - Push-side: counters and gauges through the `metrics` facade
//! - Pull-side: serializable status reports (health, circuits, pools)
//! - Tracing subscriber setup for the embedding application
//!
//! # Design Decisions
//! - This crate emits; exporting (Prometheus, logs shipping) is the
//!   telemetry collaborator's job

pub mod logging;
pub mod metrics;
pub mod status;

pub use status::{EndpointReport, StatusReport};
