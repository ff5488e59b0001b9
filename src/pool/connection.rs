//! Database transport seam.
//!
//! The router never speaks a wire protocol itself. A [`Connector`] dials an
//! address and yields [`Connection`]s; payloads pass through opaque in both
//! directions. Production code plugs in a real driver, tests plug in mocks.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::RouterError;
use crate::registry::EndpointId;

/// Transport-level failures, classified by what the server may have seen.
///
/// The distinction matters for write retry safety: a `Refused` error is
/// guaranteed not to have applied anything; a `Broken` error is not.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection could not be established; nothing reached the server.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The connection failed after the command was sent. The server may or
    /// may not have applied it.
    #[error("connection broken after send: {0}")]
    Broken(String),

    /// The server received the command and rejected it. Definite outcome,
    /// nothing applied.
    #[error("command rejected: {0}")]
    Rejected(String),
}

impl ConnectionError {
    /// Map a connect-phase transport error onto the router taxonomy. Nothing
    /// was sent yet, so every variant is transient unavailability.
    pub(crate) fn into_unavailable(self, endpoint: &EndpointId) -> RouterError {
        RouterError::EndpointUnavailable {
            endpoint: endpoint.clone(),
            reason: self.to_string(),
        }
    }
}

/// Replication state reported by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationStatus {
    /// Applied position; opaque, monotonically increasing per cluster.
    /// The primary reports its current write position.
    pub position: u64,
    /// How far behind the primary this node is. Zero for the primary.
    pub lag: Duration,
}

/// One physical database connection.
///
/// Commands on a single connection execute in submission order; no ordering
/// holds across connections.
#[async_trait]
pub trait Connection: Send {
    /// Execute an opaque command payload and return the opaque response.
    async fn execute(&mut self, payload: &[u8]) -> Result<Vec<u8>, ConnectionError>;

    /// Trivial liveness round trip.
    async fn ping(&mut self) -> Result<(), ConnectionError>;

    /// Report this node's replication position and lag.
    async fn replication_status(&mut self) -> Result<ReplicationStatus, ConnectionError>;
}

/// Factory for physical connections to one address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn Connection>, ConnectionError>;
}
