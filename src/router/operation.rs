//! Operation model.
//!
//! The router never looks inside a payload; classification comes entirely
//! from the tags the caller supplies.

use std::time::{Duration, Instant};

/// What kind of work an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
        }
    }
}

/// Consistency requirement for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Any replica will do, lag included.
    Eventual,
    /// Must observe the caller's prior write: only the primary or a replica
    /// whose applied position has reached `position` qualifies.
    ReadYourWrites { position: u64 },
}

/// A unit of work submitted to the router.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub consistency: Consistency,
    /// Hard deadline for the whole operation, waiting included.
    pub deadline: Instant,
    /// Opaque command payload, passed through to the connection untouched.
    pub payload: Vec<u8>,
}

impl Operation {
    /// A write with the given time budget.
    pub fn write(payload: impl Into<Vec<u8>>, budget: Duration) -> Self {
        Self {
            kind: OperationKind::Write,
            consistency: Consistency::Eventual,
            deadline: Instant::now() + budget,
            payload: payload.into(),
        }
    }

    /// An eventually-consistent read.
    pub fn read(payload: impl Into<Vec<u8>>, budget: Duration) -> Self {
        Self {
            kind: OperationKind::Read,
            consistency: Consistency::Eventual,
            deadline: Instant::now() + budget,
            payload: payload.into(),
        }
    }

    /// A read that must observe the caller's write at `position`.
    pub fn read_your_writes(payload: impl Into<Vec<u8>>, position: u64, budget: Duration) -> Self {
        Self {
            kind: OperationKind::Read,
            consistency: Consistency::ReadYourWrites { position },
            deadline: Instant::now() + budget,
            payload: payload.into(),
        }
    }
}
