//! Router error taxonomy.
//!
//! Callers see routing outcomes, never transport details. The split that
//! matters most is between failures that are safe to retry and
//! [`RouterError::AmbiguousWriteOutcome`], where the command may have been
//! applied and only the caller can decide what to do next.

use thiserror::Error;

use crate::registry::EndpointId;

#[derive(Debug, Error)]
pub enum RouterError {
    /// The named endpoint is not part of the current topology.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),

    /// The chosen endpoint could not serve the attempt; nothing was sent.
    /// Retryable for reads and writes alike.
    #[error("endpoint {endpoint} unavailable: {reason}")]
    EndpointUnavailable { endpoint: EndpointId, reason: String },

    /// The operation deadline expired during `phase`.
    #[error("deadline exceeded during {phase}")]
    Timeout { phase: &'static str },

    /// No endpoint satisfies the operation's requirements right now.
    #[error("no eligible endpoint for {kind}")]
    NoEligibleEndpoint { kind: &'static str },

    /// The primary is unreachable or a failover is in progress. Writes are
    /// rejected, never queued.
    #[error("primary unavailable")]
    PrimaryUnavailable,

    /// A write may or may not have been applied. Never retried by the
    /// router; surfacing it is the whole point.
    #[error("write outcome on {endpoint} is ambiguous: {reason}")]
    AmbiguousWriteOutcome { endpoint: EndpointId, reason: String },

    /// The endpoint answered with a definite failure.
    #[error("connection error on {endpoint}: {reason}")]
    Connection { endpoint: EndpointId, reason: String },

    /// A topology (construction or admin update) failed validation.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
}

impl RouterError {
    /// Whether a read hitting this error may be retried on another endpoint.
    pub fn read_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::EndpointUnavailable { .. } | RouterError::Timeout { .. }
        )
    }

    /// Whether a write hitting this error may be retried. Only failures
    /// guaranteed to have happened before the command was sent qualify.
    pub fn write_retryable(&self) -> bool {
        matches!(self, RouterError::EndpointUnavailable { .. })
    }

    /// Stable low-cardinality label for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            RouterError::UnknownEndpoint(_) => "unknown_endpoint",
            RouterError::EndpointUnavailable { .. } => "endpoint_unavailable",
            RouterError::Timeout { .. } => "timeout",
            RouterError::NoEligibleEndpoint { .. } => "no_eligible_endpoint",
            RouterError::PrimaryUnavailable => "primary_unavailable",
            RouterError::AmbiguousWriteOutcome { .. } => "ambiguous_write",
            RouterError::Connection { .. } => "connection",
            RouterError::InvalidTopology(_) => "invalid_topology",
        }
    }
}
