//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack, route table)
//!     → request.rs (request ID set and echoed)
//!     → handlers.rs (forward to one backend, or aggregate)
//!     → response.rs (relay backend response, pin JSON content type)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use handlers::AppState;
pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
