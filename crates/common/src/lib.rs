//! rigger Common Library
//!
//! Shared types and configuration for the rigger build pipeline.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{CommandSpec, OrchestratorConfig, RigConfig, TaskSpec, WatchConfig};
pub use error::{Error, Result};
pub use types::*;

/// rigger version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "rigger.toml";
