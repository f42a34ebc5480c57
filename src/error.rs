//! Crate-wide error taxonomy
//!
//! Only failures that cross the reactor boundary live here. Configuration
//! and socket-bind problems are fatal at startup; transport errors are
//! logged at the reactor and the loop continues; device-query and
//! command-level failures are absorbed into notifications and replies and
//! never surface as `AgentError`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::EncodeError;

/// Top-level error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("socket bind failed on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("peer resolution failed for {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("message encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("no reply from {peer} within {waited_ms} ms")]
    ReplyTimeout { peer: String, waited_ms: u64 },
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = AgentError::Bind {
            port: 6600,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert!(err.to_string().contains("6600"));

        let err = AgentError::ReplyTimeout {
            peer: "IS".to_string(),
            waited_ms: 2000,
        };
        assert!(err.to_string().contains("IS"));
        assert!(err.to_string().contains("2000"));
    }

    #[test]
    fn test_encode_error_converts() {
        let err: AgentError = EncodeError::EmptySender.into();
        assert!(matches!(err, AgentError::Encode(_)));
    }
}
