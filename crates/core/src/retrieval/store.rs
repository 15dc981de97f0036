use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::catalog::CatalogStore;
use crate::retrieval::embedder::Embedder;
use crate::retrieval::index::{FlatIndex, IndexError};
use crate::retrieval::RetrievalError;

/// Why a persisted index could not be served as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StaleReason {
    Missing,
    Unreadable(String),
    Corrupt(IndexError),
    DimensionChanged { indexed: usize, expected: usize },
    ModelChanged { indexed: String, expected: String },
    CountChanged { indexed: usize, expected: usize },
    Requested,
}

impl StaleReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Unreadable(_) => "unreadable",
            Self::Corrupt(_) => "corrupt",
            Self::DimensionChanged { .. } => "dimension_changed",
            Self::ModelChanged { .. } => "model_changed",
            Self::CountChanged { .. } => "count_changed",
            Self::Requested => "requested",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexLoad {
    Loaded,
    Rebuilt(StaleReason),
}

/// Index blob at a fixed path.
#[derive(Clone, Debug)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<FlatIndex, StaleReason> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Err(StaleReason::Missing),
            Err(error) => return Err(StaleReason::Unreadable(error.to_string())),
        };
        FlatIndex::from_bytes(&bytes).map_err(StaleReason::Corrupt)
    }

    /// Writes to a sibling temp file and renames it over the target.
    pub async fn write(&self, index: &FlatIndex) -> Result<(), RetrievalError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RetrievalError::Persist { path: self.path.clone(), source })?;
        }

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, index.to_bytes())
            .await
            .map_err(|source| RetrievalError::Persist { path: temp_path.clone(), source })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|source| RetrievalError::Persist { path: self.path.clone(), source })
    }

    /// Serves the persisted index when it matches `catalog` and the embedder, otherwise
    /// re-embeds every row, persists the new blob and returns it.
    pub async fn load_or_rebuild(
        &self,
        catalog: &CatalogStore,
        embedder: &dyn Embedder,
    ) -> Result<(FlatIndex, IndexLoad), RetrievalError> {
        let reason = match self.read().await {
            Ok(index) => match check_fresh(&index, catalog.expected_entries(), embedder) {
                None => {
                    tracing::info!(
                        event_name = "retrieval.index.loaded",
                        path = %self.path.display(),
                        vectors = index.count(),
                        "index loaded from disk"
                    );
                    return Ok((index, IndexLoad::Loaded));
                }
                Some(reason) => reason,
            },
            Err(reason) => reason,
        };

        tracing::warn!(
            event_name = "retrieval.index.stale",
            path = %self.path.display(),
            reason = reason.code(),
            detail = ?reason,
            "rebuilding index"
        );
        let index = self.rebuild(catalog, embedder).await?;
        Ok((index, IndexLoad::Rebuilt(reason)))
    }

    pub async fn rebuild(
        &self,
        catalog: &CatalogStore,
        embedder: &dyn Embedder,
    ) -> Result<FlatIndex, RetrievalError> {
        let vectors = embedder.embed_batch(&catalog.search_texts()).await?;
        if vectors.len() != catalog.len() {
            return Err(crate::retrieval::EmbeddingError::CountMismatch {
                expected: catalog.len(),
                actual: vectors.len(),
            }
            .into());
        }

        let index =
            FlatIndex::build(embedder.dimension(), &vectors)?.with_model_id(embedder.model_id());
        self.write(&index).await?;
        tracing::info!(
            event_name = "retrieval.index.rebuilt",
            path = %self.path.display(),
            vectors = index.count(),
            model = %embedder.model_id(),
            "index rebuilt and persisted"
        );
        Ok(index)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn check_fresh(
    index: &FlatIndex,
    expected_count: usize,
    embedder: &dyn Embedder,
) -> Option<StaleReason> {
    let dimension = embedder.dimension();
    if index.dimension() != dimension {
        let indexed = index.dimension();
        return Some(StaleReason::DimensionChanged { indexed, expected: dimension });
    }
    if index.model_id() != embedder.model_id() {
        return Some(StaleReason::ModelChanged {
            indexed: index.model_id().to_string(),
            expected: embedder.model_id().to_string(),
        });
    }
    if index.count() != expected_count {
        return Some(StaleReason::CountChanged { indexed: index.count(), expected: expected_count });
    }
    None
}
