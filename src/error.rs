use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown executor: '{0}' (expected 'atomic' or 'orchestrated')")]
    UnknownExecutor(String),

    #[error("Unknown hash engine: '{0}' (expected 'sha1', 'md5' or 'crc32')")]
    UnknownHashEngine(String),

    #[error("Operation '{operation}' is not supported by the {executor} executor")]
    UnsupportedOperation {
        operation: &'static str,
        executor: String,
    },

    #[error("Failed to parse environment variable {var_name}: value '{value}' - {error}")]
    EnvParseError {
        var_name: String,
        value: String,
        error: String,
    },

    #[error("Storage operation failed: {0}")]
    StorageError(String),

    #[error("Script error: {0}")]
    ScriptError(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl FilterError {
    pub(crate) fn unsupported(
        operation: &'static str,
        executor: impl Into<String>,
    ) -> Self {
        FilterError::UnsupportedOperation {
            operation,
            executor: executor.into(),
        }
    }
}
