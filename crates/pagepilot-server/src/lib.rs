//! The PagePilot server.
//!
//! Ties the serving substrate together: configuration, the per-tool request
//! pipeline (validation → transform → cache interception → dispatch →
//! shaping), the tool dispatcher fanning out across source adapters, and the
//! two front-door transports (HTTP and newline-delimited stream RPC).

pub mod config;
pub mod dispatch;
pub mod http;
pub mod pipeline;
pub mod prometheus;
pub mod rpc;
pub mod state;
pub mod strategy;
pub mod tools;
pub mod transform;
pub mod validation;

pub use config::AppConfig;
pub use state::AppState;
