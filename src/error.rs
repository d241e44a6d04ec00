use thiserror::Error;

/// Errors surfaced by the learning engine.
///
/// A missing category or model is never an error: queries without history
/// take the cold-start path instead.
#[derive(Debug, Error)]
pub enum LearningError {
    /// I/O or transaction failure in the attempt store. The failed operation
    /// left no partial effect and may be retried by the caller.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Filesystem failure while preparing the store location.
    #[error("storage location error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input, rejected before storage is touched.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("failed to (de)serialize insight payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp stored in database: {0}")]
    Timestamp(String),
}

impl LearningError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

pub type LearningResult<T> = Result<T, LearningError>;
