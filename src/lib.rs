//! Edge API gateway library.
//!
//! Fronts a users service and an orders service: per-client rate limiting,
//! optional bearer authentication, per-backend circuit breakers, request
//! forwarding and a composite user-details endpoint.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod upstream;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
