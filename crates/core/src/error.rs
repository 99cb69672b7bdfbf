use thiserror::Error;

pub type CoachResult<T> = Result<T, CoachError>;

#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rule evaluation error: {0}")]
    Evaluation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for CoachError {
    fn from(err: config::ConfigError) -> Self {
        CoachError::Config(err.to_string())
    }
}
