//! Error handling for the Amigo gateway
//!
//! Nothing in the aggregation core is fatal: ingest logs and drops bad
//! input, dispatch failures are reported as outcomes. These types cover
//! the paths that do propagate (identity parsing, transport line parsing,
//! the stdin bridge).

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Raw report value that cannot be coerced to a numeric reading
    #[error("Malformed reading: {0}")]
    MalformedReading(String),

    /// Parse error (device identity, transport lines)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
