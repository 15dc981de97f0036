use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Dense text representation; the length equals the producing embedder's dimension.
pub type EmbeddingVector = Vec<f32>;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedder initialization failed: {0}")]
    Initialization(String),
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedder returned a {actual}-dimensional vector, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

/// Maps text in any script to a fixed-width vector. Must be deterministic for a fixed
/// model, and must fail instead of returning placeholder vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Offline feature-hashing embedder.
///
/// Every lowercased word contributes one feature and every character trigram of the
/// space-padded word contributes a half-weight feature. Features are hashed with blake3
/// into `dimension` signed buckets and the result is L2-normalized. Words are split on
/// Unicode alphanumerics, so Latin and Arabic text need no per-language handling.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::Initialization(
                "hashing embedder dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension, model_id: format!("hashing-blake3-{dimension}") })
    }

    pub fn embed_sync(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0.0_f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered.split(|ch: char| !ch.is_alphanumeric()).filter(|word| !word.is_empty())
        {
            self.add_feature(&mut vector, "w", word, WORD_WEIGHT);

            let padded: Vec<char> = std::iter::once(' ')
                .chain(word.chars())
                .chain(std::iter::once(' '))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, "t", &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], kind: &str, feature: &str, weight: f32) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update(&[0]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let mut bucket_bytes = [0_u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}

#[async_trait]
pub trait EmbedderFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Embedder>, EmbeddingError>;
}

/// Initializes the wrapped embedder on first use, at most once.
///
/// Concurrent first callers wait on the same initialization. A failed initialization is
/// returned to every caller that observes it and is retried by the next call.
pub struct LazyEmbedder {
    factory: Arc<dyn EmbedderFactory>,
    cell: OnceCell<Arc<dyn Embedder>>,
    dimension: usize,
    model_id: String,
}

impl LazyEmbedder {
    pub fn new(
        factory: Arc<dyn EmbedderFactory>,
        dimension: usize,
        model_id: impl Into<String>,
    ) -> Self {
        Self { factory, cell: OnceCell::new(), dimension, model_id: model_id.into() }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<&Arc<dyn Embedder>, EmbeddingError> {
        self.cell
            .get_or_try_init(|| async {
                let embedder = self.factory.create().await?;
                if embedder.dimension() != self.dimension {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.dimension,
                        actual: embedder.dimension(),
                    });
                }
                tracing::info!(
                    event_name = "retrieval.embedder.initialized",
                    model = %embedder.model_id(),
                    dimension = embedder.dimension(),
                    "embedder initialized"
                );
                Ok(embedder)
            })
            .await
    }
}

#[async_trait]
impl Embedder for LazyEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        self.get().await?.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        self.get().await?.embed_batch(texts).await
    }
}
