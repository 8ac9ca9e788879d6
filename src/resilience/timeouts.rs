//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound every backend exchange with the client-side deadline
//! - Keep timeout errors distinct from transport errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - One [`Deadline`] covers a whole exchange, headers and body alike
//! - The deadline is independent of the circuit breaker's open timeout

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Returned when a call outlives its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct Elapsed(pub Duration);

/// A fixed point in time by which a backend exchange must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// A deadline `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    /// The budget this deadline was created with.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Await `future`, giving up when the deadline passes.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Elapsed>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.at, future)
            .await
            .map_err(|_| Elapsed(self.limit))
    }
}
