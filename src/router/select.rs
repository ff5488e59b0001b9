//! Weighted replica selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::registry::EndpointState;

/// Weighted round-robin selector.
///
/// Stateless per call except for one rotating cursor shared across calls;
/// an endpoint with weight 3 owns three consecutive cursor slots, which
/// approximates even distribution proportional to weight even as the
/// eligible set changes between calls.
#[derive(Debug)]
pub struct WeightedCursor {
    counter: AtomicUsize,
}

impl WeightedCursor {
    pub fn new() -> Self {
        // Random start so several router instances do not all hit the same
        // replica first.
        Self {
            counter: AtomicUsize::new(fastrand::usize(0..1024)),
        }
    }

    /// Pick one of `candidates` proportionally to weight.
    pub fn pick<'a>(&self, candidates: &[&'a EndpointState]) -> Option<&'a EndpointState> {
        if candidates.is_empty() {
            return None;
        }

        let total: usize = candidates
            .iter()
            .map(|e| e.weight.max(1) as usize)
            .sum();
        let mut slot = self.counter.fetch_add(1, Ordering::Relaxed) % total;

        for candidate in candidates {
            let weight = candidate.weight.max(1) as usize;
            if slot < weight {
                return Some(candidate);
            }
            slot -= weight;
        }
        // Unreachable: slot < total by construction.
        candidates.last().copied()
    }
}

impl Default for WeightedCursor {
    fn default() -> Self {
        Self::new()
    }
}
