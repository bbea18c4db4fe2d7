use models::MessageProcessingError;

/// Wraps `MessageProcessingError` with the one failure mode every handler
/// method can also hit that isn't content-specific: a database error. Kept
/// separate from `MessageProcessingError` itself since `models` doesn't
/// depend on sqlx -- this crate is the first layer that talks to both.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Processing(#[from] MessageProcessingError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl HandlerError {
    /// Database errors are always worth retrying; content errors carry
    /// their own classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Processing(e) => e.is_retryable(),
            HandlerError::Db(_) => true,
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;
