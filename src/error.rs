use thiserror::Error;

/// Boxed cause attached to execution-time failures so diagnostics keep the
/// original driver error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Framework error types
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("duplicate connector: '{0}' is already registered")]
    DuplicateConnector(String),

    #[error("unknown connector: '{0}'")]
    UnknownConnector(String),

    #[error("pool timeout: no connection for '{connector}' within {waited_ms} ms")]
    PoolTimeout { connector: String, waited_ms: u64 },

    #[error("parameter mismatch: statement has {expected} placeholders but {actual} values are bound")]
    ParameterMismatch { expected: usize, actual: usize },

    #[error("execution failed on '{connector}' for statement `{statement}`: {source}")]
    Execution {
        connector: String,
        statement: String,
        #[source]
        source: BoxError,
    },

    #[error("unsupported native type '{native_type}' in column '{column}'")]
    UnsupportedType { native_type: String, column: String },

    #[error("transform '{transform}' failed: {source}")]
    Transform {
        transform: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid SQL: {0}")]
    InvalidSql(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FrameError {
    /// Wrap a driver error into an execution failure, keeping the cause.
    pub fn execution(
        connector: impl Into<String>,
        statement: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        FrameError::Execution {
            connector: connector.into(),
            statement: statement.into(),
            source: source.into(),
        }
    }

    /// Wrap a hook failure, naming the offending transform.
    pub fn transform(transform: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FrameError::Transform {
            transform: transform.into(),
            source: source.into(),
        }
    }
}

/// Convert anyhow::Error to FrameError
impl From<anyhow::Error> for FrameError {
    fn from(err: anyhow::Error) -> Self {
        FrameError::Internal(err.to_string())
    }
}

/// Convert config::ConfigError to FrameError
impl From<config::ConfigError> for FrameError {
    fn from(err: config::ConfigError) -> Self {
        FrameError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_execution_error_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed");
        let err = FrameError::execution("primary", "SELECT 1", cause);

        assert!(err.to_string().contains("primary"));
        assert!(err.to_string().contains("SELECT 1"));
        let source = err.source().expect("cause must be preserved");
        assert!(source.to_string().contains("socket closed"));
    }

    #[test]
    fn test_transform_error_names_transform() {
        let err = FrameError::transform("redact_emails", "regex did not compile".to_string());
        assert!(err.to_string().contains("redact_emails"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_parameter_mismatch_message() {
        let err = FrameError::ParameterMismatch {
            expected: 3,
            actual: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('1'));
    }
}
