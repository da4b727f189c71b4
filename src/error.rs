use thiserror::Error;

/// Result type alias for ngrok tunnel operations
pub type NgrokResult<T> = Result<T, NgrokError>;

/// Error types for the ngrok tunnel supervisor
#[derive(Error, Debug)]
pub enum NgrokError {
    /// The agent binary could not be located or executed
    #[error("ngrok binary not found: {0}")]
    BinaryNotFound(String),

    /// The agent reported a failed command; carries its reason verbatim
    #[error("{0}")]
    Tunnel(String),

    /// No announcement was seen before the timeout elapsed
    #[error("Unable to fetch external url within {timeout_secs}s")]
    FetchUrl { timeout_secs: u64 },

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Error: {0}")]
    Other(String),
}

impl From<eyre::Error> for NgrokError {
    fn from(err: eyre::Error) -> Self {
        NgrokError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_error_message_is_agent_reason() {
        let err = NgrokError::Tunnel("address already in use".to_string());
        assert_eq!(err.to_string(), "address already in use");
    }

    #[test]
    fn test_fetch_url_message_mentions_timeout() {
        let err = NgrokError::FetchUrl { timeout_secs: 10 };
        assert!(err.to_string().contains("10s"));
    }
}
