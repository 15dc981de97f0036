use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::flows::FlowTransitionError;
use crate::retrieval::{EmbeddingError, IndexError, RetrievalError};
use crate::transcripts::TranscriptLogError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Transcripts(#[from] TranscriptLogError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<EmbeddingError> for ApplicationError {
    fn from(value: EmbeddingError) -> Self {
        Self::Retrieval(RetrievalError::Embedding(value))
    }
}

impl From<IndexError> for ApplicationError {
    fn from(value: IndexError) -> Self {
        Self::Retrieval(RetrievalError::Index(value))
    }
}

impl ApplicationError {
    /// Stable machine-readable class for CLI and log output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Catalog(_) | Self::Retrieval(RetrievalError::Catalog(_)) => "catalog",
            Self::Retrieval(RetrievalError::Embedding(_)) => "embedding",
            Self::Retrieval(RetrievalError::Index(_))
            | Self::Retrieval(RetrievalError::Persist { .. }) => "index",
            Self::Transcripts(_) | Self::Persistence(_) => "persistence",
            Self::Flow(_) => "flow",
            Self::Integration(_) => "integration",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::InvalidInput(message) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::Flow(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            other @ (ApplicationError::Catalog(_)
            | ApplicationError::Retrieval(_)
            | ApplicationError::Transcripts(_)
            | ApplicationError::Persistence(_)
            | ApplicationError::Integration(_)) => Self::ServiceUnavailable {
                message: other.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::Config(error) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
        }
    }
}
