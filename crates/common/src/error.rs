//! Error types for rigger configuration and shared types

use thiserror::Error;

/// Result type alias using the rigger common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and shared type errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("Unknown bump level: {0} (expected major, minor or patch)")]
    UnknownBumpLevel(String),
}
