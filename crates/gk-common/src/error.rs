//! Error types shared by the gatekeeper crates

use thiserror::Error;

/// Gatekeeper common error type
#[derive(Error, Debug)]
pub enum GkError {
    /// Hardware address could not be parsed
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// Integer code does not map to a known variant
    #[error("unknown {what} code: {code}")]
    UnknownCode {
        /// Which enumeration was being decoded
        what: &'static str,
        /// The offending code
        code: i32,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error
    #[error("config error: {0}")]
    ConfigError(String),
}

/// Result type for gatekeeper common operations
pub type GkResult<T> = Result<T, GkError>;
