/// Error type shared by the transport, streaming and driver layers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Operation cancelled")]
    Cancelled,
}

/// Broad error category, used by drivers to decide what to tell the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connection,
    Server,
    Protocol,
    Interrupted,
}

impl ClientError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Config(_) => ErrorCategory::Configuration,
            ClientError::Connection(_) => ErrorCategory::Connection,
            ClientError::Upstream { .. } => ErrorCategory::Server,
            ClientError::InvalidResponse(_) => ErrorCategory::Protocol,
            ClientError::Cancelled => ErrorCategory::Interrupted,
        }
    }

    /// True for unreachable or reset servers.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ClientError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return ClientError::InvalidResponse(err.to_string());
        }
        if err.is_builder() {
            return ClientError::Config(err.to_string());
        }
        // connect, timeout, request and body errors all mean the exchange was cut short
        ClientError::Connection(err.to_string())
    }
}

impl From<std::convert::Infallible> for ClientError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl From<crate::config::ConfigError> for ClientError {
    fn from(err: crate::config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_distinct_from_server_errors() {
        let conn = ClientError::Connection("refused".into());
        let upstream = ClientError::Upstream {
            status: 500,
            message: "boom".into(),
        };
        assert!(conn.is_connection_failure());
        assert!(!upstream.is_connection_failure());
        assert_eq!(upstream.category(), ErrorCategory::Server);
    }

    #[test]
    fn upstream_display_includes_status() {
        let err = ClientError::Upstream {
            status: 401,
            message: "bad key".into(),
        };
        assert_eq!(err.to_string(), "Upstream error: status=401, message=bad key");
    }
}
