//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket)
//!     → auth.rs (bearer token on protected routes)
//!     → payload.rs (required fields on writes)
//!     → Pass to forwarder / aggregator
//! ```
//!
//! # Design Decisions
//! - Cheapest check first: admission before token verification
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod auth;
pub mod payload;
pub mod rate_limit;

pub use auth::{AuthError, HmacJwtVerifier, Subject, TokenVerifier};
pub use payload::PayloadRules;
pub use rate_limit::TokenBucketLimiter;
