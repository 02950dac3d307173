//! Job system errors.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("no handler registered for task type {0}")]
    UnknownTask(String),

    #[error("task store error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type JobResult<T> = Result<T, JobError>;

impl From<WardenError> for JobError {
    fn from(err: WardenError) -> Self {
        JobError::Handler(err.to_string())
    }
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        JobError::Handler(err.to_string())
    }
}

impl From<JobError> for WardenError {
    fn from(err: JobError) -> Self {
        WardenError::Queue(err.to_string())
    }
}
