//! # Error Types
//!
//! Custom error types for CRSF Failover using `thiserror`.
//!
//! Steady-state decode problems (stale frames, CRC mismatches, slot overruns)
//! never show up here: they are logged and the link heals on the next frame.

use thiserror::Error;

/// Main error type for CRSF Failover
#[derive(Debug, Error)]
pub enum CrsfFailoverError {
    /// CRSF protocol errors
    #[error("CRSF protocol error: {0}")]
    CrsfProtocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the configured receiver ports could be opened
    #[error("No receiver port could be opened (tried: {0})")]
    NoReceiverPort(String),
}

/// Result type alias for CRSF Failover
pub type Result<T> = std::result::Result<T, CrsfFailoverError>;
