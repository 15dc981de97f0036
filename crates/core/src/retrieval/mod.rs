pub mod embedder;
pub mod index;
pub mod service;
pub mod store;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::domain::catalog::CatalogEntry;

pub use embedder::{
    Embedder, EmbedderFactory, EmbeddingError, EmbeddingVector, HashingEmbedder, LazyEmbedder,
};
pub use index::{FlatIndex, IndexError, Neighbor};
pub use service::{RetrievalService, RetrievalSnapshot};
pub use store::{IndexLoad, IndexStore, StaleReason};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("could not persist index to `{path}`: {source}")]
    Persist { path: PathBuf, source: std::io::Error },
}

/// Ranked catalog lookup used by the recommendation path.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CatalogEntry>, RetrievalError>;
}
