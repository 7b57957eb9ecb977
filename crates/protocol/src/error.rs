//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed or unexpected JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Line length exceeds maximum allowed size
    #[error("Line too large: {size} bytes (max: {max})")]
    LineTooLarge { size: usize, max: usize },

    /// Peer closed the stream before a full line arrived
    #[error("Connection closed")]
    Closed,

    /// I/O error during line operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::LineTooLarge {
            size: 100_000,
            max: 65_536,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("100000"));
        assert!(msg.contains("65536"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Serialization(_)));
    }
}
