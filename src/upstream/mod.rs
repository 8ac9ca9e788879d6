//! Upstream subsystem: everything that talks to backend services.
//!
//! # Data Flow
//! ```text
//! Single-backend route:
//!     → forwarder.rs (build, breaker + deadline)
//!     → body.rs (stream response back under the same deadline)
//!
//! Composite route:
//!     → aggregate.rs (two concurrent fetches, join, filter, merge)
//!         → forwarder.rs for each branch
//!         → document.rs (opaque records, foreign key comparison)
//! ```
//!
//! # Design Decisions
//! - Each backend owns exactly one circuit breaker (backend.rs)
//! - Backend payloads are never modelled; unknown fields pass through

pub mod aggregate;
pub mod backend;
pub mod body;
pub mod document;
pub mod forwarder;

pub use aggregate::AggregationCoordinator;
pub use backend::Backend;
pub use body::{UpstreamBody, UpstreamBodyError};
pub use document::{Document, RecordKey};
pub use forwarder::{Fetched, ForwardError, RequestForwarder};
