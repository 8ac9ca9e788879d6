//! Client for the edge gateway's HTTP API.

pub mod client;

pub use client::{CircuitReport, CircuitStats, GatewayClient, GatewayFailure, HealthReport, SdkResult};
