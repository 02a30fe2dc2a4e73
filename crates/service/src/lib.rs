//! Service layer for the pinpay gateway.
//!
//! Wraps the upload orchestrator, index reconciler and retrieval
//! gateway from `common` in:
//! - Configuration (TOML file with CLI overrides applied by the binary)
//! - State management (long-lived storage and ledger adapters)
//! - HTTP handlers (upload, index, quote, allocation, retrieval, health)

pub mod config;
pub mod http;
pub mod state;

// Re-export key types for convenience
pub use config::{Config, ConfigError};
pub use state::{State as ServiceState, StateSetupError};
