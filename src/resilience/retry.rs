//! Retry policy.
//!
//! Reads are idempotent and may be retried on transient failures,
//! reselecting an endpoint each attempt. Writes are retried only for
//! failures guaranteed to have happened before the command was sent;
//! anything after send is ambiguous and must surface to the caller.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::RouterError;
use crate::resilience::backoff::calculate_backoff;
use crate::router::operation::OperationKind;

/// Decides whether and when a failed attempt may be repeated.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Retry budget for an operation kind (retries, not total attempts).
    pub fn limit(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::Read => self.config.retry_limit_reads,
            OperationKind::Write => self.config.retry_limit_writes,
        }
    }

    /// Whether attempt number `attempt` (zero-based, counting retries
    /// already performed) may be followed by another one for this error.
    pub fn should_retry(&self, kind: OperationKind, error: &RouterError, attempt: u32) -> bool {
        if attempt >= self.limit(kind) {
            return false;
        }
        match kind {
            OperationKind::Read => error.read_retryable(),
            OperationKind::Write => error.write_retryable(),
        }
    }

    /// Delay before the given retry attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.config.base_delay_ms, self.config.max_delay_ms)
    }
}
