//! Error handling for the blexfer CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("blexfer core error: {0}")]
    Blexfer(#[from] blexfer_core::BlexferError),

    #[error("BLE error: {0}")]
    Ble(#[from] blexfer_ble::BleError),

    #[error("Configuration error: {0}")]
    Config(#[from] blexfer_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Session task failed: {0}")]
    Session(String),

    #[error("Session ended before a message arrived")]
    NoMessage,
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<tokio::task::JoinError> for CliError {
    fn from(err: tokio::task::JoinError) -> Self {
        CliError::Session(err.to_string())
    }
}
