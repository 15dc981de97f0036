use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use souq_core::config::{EmbeddingConfig, EmbeddingProvider};
use souq_core::retrieval::{EmbedderFactory, LazyEmbedder};
use souq_core::{Embedder, EmbeddingError, EmbeddingVector, HashingEmbedder};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const BATCH_SIZE: usize = 64;
const MAX_RETRIES: u32 = 3;

/// Client for OpenAI-compatible `/embeddings` endpoints (OpenAI, Ollama's `/v1`).
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    dimension: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(url)) => url.trim_end_matches('/').to_string(),
            (EmbeddingProvider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (provider, None) => {
                return Err(EmbeddingError::Initialization(format!(
                    "embedding.base_url is required for the {} provider",
                    provider.as_str()
                )))
            }
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| EmbeddingError::Initialization(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{base_url}/embeddings"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            max_retries: MAX_RETRIES,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn embed_chunk(&self, inputs: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let mut attempt = 0_u32;
        loop {
            let mut request = self
                .client
                .post(&self.endpoint)
                .json(&EmbeddingRequest { model: &self.model, input: inputs });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key.expose_secret());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = response
                            .json()
                            .await
                            .map_err(|error| EmbeddingError::Request(error.to_string()))?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        return self.check(inputs.len(), parsed);
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Request(format!("{status}: {body}")));
                }
                Err(error) => {
                    if (error.is_timeout() || error.is_connect()) && attempt < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Request(error.to_string()));
                }
            }
        }
    }

    fn check(
        &self,
        expected: usize,
        response: EmbeddingResponse,
    ) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if response.data.len() != expected {
            return Err(EmbeddingError::CountMismatch { expected, actual: response.data.len() });
        }
        response
            .data
            .into_iter()
            .map(|entry| {
                if entry.embedding.len() == self.dimension {
                    Ok(entry.embedding)
                } else {
                    Err(EmbeddingError::DimensionMismatch {
                        expected: self.dimension,
                        actual: entry.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(200 * (1 << attempt.min(5)))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let mut vectors = self.embed_chunk(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch { expected: 1, actual: 0 })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }
}

/// Builds the embedder named by configuration when first needed.
pub struct ConfiguredEmbedderFactory {
    config: EmbeddingConfig,
}

impl ConfiguredEmbedderFactory {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmbedderFactory for ConfiguredEmbedderFactory {
    async fn create(&self) -> Result<Arc<dyn Embedder>, EmbeddingError> {
        match self.config.provider {
            EmbeddingProvider::Hashing => {
                Ok(Arc::new(HashingEmbedder::new(self.config.dimension)?))
            }
            EmbeddingProvider::OpenAi | EmbeddingProvider::Ollama => {
                Ok(Arc::new(HttpEmbedder::from_config(&self.config)?))
            }
        }
    }
}

/// Process-wide embedder: created lazily, once, from configuration.
pub fn build_embedder(config: &EmbeddingConfig) -> Arc<LazyEmbedder> {
    let model_id = match config.provider {
        EmbeddingProvider::Hashing => format!("hashing-blake3-{}", config.dimension),
        EmbeddingProvider::OpenAi | EmbeddingProvider::Ollama => config.model.clone(),
    };
    Arc::new(LazyEmbedder::new(
        Arc::new(ConfiguredEmbedderFactory::new(config.clone())),
        config.dimension,
        model_id,
    ))
}
