use souq_core::TranscriptLogError;
use thiserror::Error;

pub mod transcript;

pub use transcript::SqlTranscriptLog;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for TranscriptLogError {
    fn from(error: RepositoryError) -> Self {
        TranscriptLogError::Storage(error.to_string())
    }
}
