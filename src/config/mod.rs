//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, GATEWAY_* overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once at startup to build breakers, limiter and forwarders
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AggregationConfig, AuthConfig, BackendConfig, BreakerConfig, CorsConfig, GatewayConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, PayloadRule, RateLimitConfig,
    SecurityConfig, TimeoutConfig, ValidationConfig,
};
