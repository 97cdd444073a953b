use thiserror::Error;

/// podshim error types
#[derive(Error, Debug)]
pub enum ShimError {
    /// Transport or engine socket unreachable
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Required request field missing or empty
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failure reported by the container engine.
    ///
    /// `context` is the short prefix naming the step that failed
    /// (e.g. "pull image", "inspect image").
    #[error("{context}: {message}")]
    EngineError { context: String, message: String },

    /// Container or image identifier unknown to the engine
    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ShimError {
    /// Wrap an engine failure with the step that produced it.
    pub fn engine(context: impl Into<String>, message: impl ToString) -> Self {
        ShimError::EngineError {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Re-prefix an engine error with an outer step name.
    ///
    /// Non-engine errors (unknown handles, connection failures) keep their
    /// kind so callers can still tell them apart. An error already carrying
    /// `context` is returned unchanged.
    pub fn within(self, context: &str) -> Self {
        match self {
            ShimError::EngineError {
                context: ref inner, ..
            } if inner == context => self,
            ShimError::EngineError {
                context: inner,
                message,
            } => ShimError::EngineError {
                context: context.to_string(),
                message: format!("{}: {}", inner, message),
            },
            other => other,
        }
    }
}

impl From<serde_yaml::Error> for ShimError {
    fn from(err: serde_yaml::Error) -> Self {
        ShimError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ShimError {
    fn from(err: serde_json::Error) -> Self {
        ShimError::ConfigError(err.to_string())
    }
}

/// Result type alias for podshim operations
pub type Result<T> = std::result::Result<T, ShimError>;
