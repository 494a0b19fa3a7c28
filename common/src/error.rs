use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AskDbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema introspection failed: {0}")]
    Schema(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("execution error: {0}")]
    Execution(ExecutionError),

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("tracing initialization failed: {0}")]
    Tracing(String),
}

/// database-side failure, carrying the vendor code (sqlstate) when the
/// server supplied one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    pub code: Option<String>,
    pub message: String,
}

impl ExecutionError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<ExecutionError> for AskDbError {
    fn from(e: ExecutionError) -> Self {
        AskDbError::Execution(e)
    }
}

impl From<csv::Error> for AskDbError {
    fn from(e: csv::Error) -> Self {
        AskDbError::Metrics(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AskDbError>;
