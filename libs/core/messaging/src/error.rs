//! Error types for broker connectivity.

use core_config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Error categories determine whether a failure is worth retrying.
///
/// - **Configuration**: unknown or missing broker type, never retried
/// - **Structural**: no client to act on, never retried
/// - **Transient**: backend failure, retried under the backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Structural,
    Transient,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Structural => write!(f, "structural"),
            ErrorCategory::Transient => write!(f, "transient"),
        }
    }
}

/// Errors raised by broker clients, the connection manager and the supervisor.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No client could be resolved for the configured broker type, or a
    /// handle carries no client.
    #[error("broker client not recognized: {0}")]
    ClientNotRecognized(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("consume error: {0}")]
    Consume(String),

    #[error("close error: {0}")]
    Close(String),

    /// The reconnection channel has no receiver left.
    #[error("reconnect channel closed")]
    ChannelClosed,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[cfg(feature = "rabbitmq")]
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

impl BrokerError {
    pub fn not_recognized(broker_type: impl Into<String>) -> Self {
        Self::ClientNotRecognized(broker_type.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BrokerError::ClientNotRecognized(_) => ErrorCategory::Configuration,
            BrokerError::Config(_) => ErrorCategory::Configuration,
            BrokerError::ChannelClosed => ErrorCategory::Structural,
            BrokerError::Connection(_)
            | BrokerError::Publish(_)
            | BrokerError::Consume(_)
            | BrokerError::Close(_) => ErrorCategory::Transient,
            #[cfg(feature = "rabbitmq")]
            BrokerError::Amqp(_) => ErrorCategory::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_recognized_message() {
        let err = BrokerError::not_recognized("unknown-backend");
        assert_eq!(
            err.to_string(),
            "broker client not recognized: unknown-backend"
        );
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(BrokerError::connection("refused").is_retryable());
        assert!(BrokerError::Publish("nack".into()).is_retryable());
        assert!(!BrokerError::ChannelClosed.is_retryable());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: BrokerError = ConfigError::MissingEnvVar("BROKER_TYPE".into()).into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("BROKER_TYPE"));
    }
}
