//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (short-circuit if the backend is isolated)
//!     → timeouts.rs (enforce the upstream deadline)
//!     → outcome recorded by the breaker (success / failure)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries at any layer; the half-open probe is the only re-attempt
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerError, BreakerSettings, CallBreaker, CallPermit, CircuitState, RollingCounts,
};
