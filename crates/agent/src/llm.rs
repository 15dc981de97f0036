use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use souq_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completion client for OpenAI, Anthropic and Ollama.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 512;

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build LLM HTTP client")?;

        let base_url = config.base_url.as_deref().map(|url| url.trim_end_matches('/'));
        let endpoint = match config.provider {
            LlmProvider::OpenAi => {
                format!("{}/chat/completions", base_url.unwrap_or(OPENAI_BASE_URL))
            }
            LlmProvider::Anthropic => {
                format!("{}/v1/messages", base_url.unwrap_or(ANTHROPIC_BASE_URL))
            }
            LlmProvider::Ollama => {
                let base = base_url.context("llm.base_url is required for ollama")?;
                format!("{base}/api/chat")
            }
            LlmProvider::Disabled => anyhow::bail!("llm provider is disabled"),
        };

        Ok(Self {
            client,
            provider: config.provider,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let messages = vec![ChatMessage { role: "user", content: prompt }];
        let builder = self.client.post(&self.endpoint);
        match self.provider {
            LlmProvider::Anthropic => builder
                .header("x-api-key", self.secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&ChatRequest {
                    model: &self.model,
                    messages,
                    max_tokens: Some(MAX_TOKENS),
                    temperature: 0.0,
                    stream: None,
                }),
            LlmProvider::Ollama => builder.json(&ChatRequest {
                model: &self.model,
                messages,
                max_tokens: None,
                temperature: 0.0,
                stream: Some(false),
            }),
            LlmProvider::OpenAi | LlmProvider::Disabled => {
                builder.bearer_auth(self.secret()).json(&ChatRequest {
                    model: &self.model,
                    messages,
                    max_tokens: Some(MAX_TOKENS),
                    temperature: 0.0,
                    stream: None,
                })
            }
        }
    }

    fn secret(&self) -> &str {
        self.api_key.as_ref().map(|key| key.expose_secret()).unwrap_or_default()
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn retry_backoff(attempt: u32) -> Duration {
        Duration::from_millis(250 * (1 << attempt.min(4)))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0_u32;
        loop {
            match self.request(prompt).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: Value =
                            response.json().await.context("failed to parse LLM response")?;
                        return extract_completion(self.provider, &body)
                            .context("LLM response carried no completion text");
                    }

                    let body = response.text().await.unwrap_or_default();
                    if Self::should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    anyhow::bail!("LLM request failed ({status}): {body}");
                }
                Err(error) => {
                    if (error.is_timeout() || error.is_connect()) && attempt < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(error).context("LLM request could not be sent");
                }
            }
        }
    }
}

/// `None` when the provider is disabled.
pub fn build_llm_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    if config.provider == LlmProvider::Disabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(HttpLlmClient::from_config(config)?)))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct TextBlock {
    #[serde(default)]
    text: String,
}

fn extract_completion(provider: LlmProvider, body: &Value) -> Option<String> {
    let text = match provider {
        LlmProvider::Anthropic => {
            let blocks: Vec<TextBlock> = serde_json::from_value(body.get("content")?.clone()).ok()?;
            blocks.into_iter().map(|block| block.text).collect::<Vec<_>>().join("")
        }
        LlmProvider::Ollama => body.pointer("/message/content")?.as_str()?.to_string(),
        LlmProvider::OpenAi | LlmProvider::Disabled => {
            body.pointer("/choices/0/message/content")?.as_str()?.to_string()
        }
    };
    Some(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use souq_core::config::{LlmConfig, LlmProvider};

    use super::{build_llm_client, extract_completion, HttpLlmClient};

    fn config(provider: LlmProvider, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("sk-test".to_string().into()),
            base_url: base_url.map(str::to_string),
            model: "test-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn completion_text_is_extracted_per_provider() {
        let openai = json!({"choices": [{"message": {"content": " greet \n"}}]});
        assert_eq!(extract_completion(LlmProvider::OpenAi, &openai).as_deref(), Some("greet"));

        let anthropic = json!({"content": [{"type": "text", "text": "product_"}, {"type": "text", "text": "recommend"}]});
        assert_eq!(
            extract_completion(LlmProvider::Anthropic, &anthropic).as_deref(),
            Some("product_recommend")
        );

        let ollama = json!({"message": {"role": "assistant", "content": "smalltalk"}});
        assert_eq!(extract_completion(LlmProvider::Ollama, &ollama).as_deref(), Some("smalltalk"));

        assert_eq!(extract_completion(LlmProvider::OpenAi, &json!({"choices": []})), None);
    }

    #[test]
    fn endpoints_follow_provider_conventions() {
        let openai =
            HttpLlmClient::from_config(&config(LlmProvider::OpenAi, None)).expect("client");
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");

        let ollama_config = config(LlmProvider::Ollama, Some("http://localhost:11434/"));
        let ollama = HttpLlmClient::from_config(&ollama_config).expect("client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn disabled_provider_builds_no_client() {
        let client = build_llm_client(&config(LlmProvider::Disabled, None)).expect("build");
        assert!(client.is_none());
    }
}
