//! Pool and driver error types.

use thiserror::Error;

/// Error raised by the underlying database driver.
///
/// The pool treats driver errors as opaque: they carry a message and,
/// when the driver supplies one, the SQLSTATE code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    sql_state: Option<String>,
}

impl DriverError {
    /// Create a driver error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
        }
    }

    /// Attach a SQLSTATE code.
    #[must_use]
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The SQLSTATE code, if any.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }
}

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Connection creation failed.
    #[error("failed to create connection: {0}")]
    ConnectionCreation(#[source] DriverError),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// Maximum connections reached.
    #[error("maximum connections ({max}) reached")]
    MaxConnectionsReached {
        /// Maximum allowed connections.
        max: u32,
    },

    /// The physical connection has already been closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// An operation received an argument it cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The driver reported an error.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// An interceptor failed.
    #[error("interceptor {name} failed: {source}")]
    Interceptor {
        /// Name of the failing interceptor.
        name: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_sql_state() {
        let err = DriverError::new("syntax error").with_sql_state("42000");
        assert_eq!(err.message(), "syntax error");
        assert_eq!(err.sql_state(), Some("42000"));
        assert_eq!(err.to_string(), "syntax error");
    }

    #[test]
    fn test_pool_error_from_driver() {
        let err: PoolError = DriverError::new("boom").into();
        assert!(matches!(err, PoolError::Driver(_)));
        assert_eq!(err.to_string(), "driver error: boom");
    }

    #[test]
    fn test_max_connections_message() {
        let err = PoolError::MaxConnectionsReached { max: 4 };
        assert_eq!(err.to_string(), "maximum connections (4) reached");
    }
}
