use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use souq_core::config::TranscriptionConfig;
use souq_core::Language;

/// Language code reported when detection produced nothing.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language_code: String,
}

impl Transcript {
    pub fn new(text: impl Into<String>, language_code: impl Into<String>) -> Self {
        Self { text: text.into(), language_code: language_code.into() }
    }

    /// Blank text or the bare `unknown` marker cannot be answered.
    pub fn is_usable(&self) -> bool {
        let text = self.text.trim();
        !text.is_empty() && !text.eq_ignore_ascii_case(UNKNOWN_LANGUAGE)
    }

    /// Detected language, if the provider reported one.
    pub fn language(&self) -> Option<Language> {
        let code = self.language_code.trim();
        if code.is_empty() || code.eq_ignore_ascii_case(UNKNOWN_LANGUAGE) {
            None
        } else {
            Some(Language::from_code(code))
        }
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media_ref: &str) -> Result<Transcript>;
}

/// AssemblyAI-style client: fetch the media, upload it, request a transcript with language
/// detection, then poll until the job settles.
pub struct HttpTranscriber {
    client: Client,
    base_url: String,
    api_key: SecretString,
    media_username: Option<String>,
    media_password: Option<SecretString>,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
    language_detection: bool,
}

#[derive(Deserialize)]
struct TranscriptJob {
    id: String,
}

#[derive(Deserialize)]
struct TranscriptStatus {
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpTranscriber {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config.api_key.clone().context("transcription.api_key is required")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build transcription HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            media_username: config.media_username.clone(),
            media_password: config.media_password.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        })
    }

    async fn download(&self, media_ref: &str) -> Result<Vec<u8>> {
        let mut request = self.client.get(media_ref);
        if let Some(username) = &self.media_username {
            let password = self.media_password.as_ref().map(|secret| secret.expose_secret());
            request = request.basic_auth(username, password);
        }
        let response = request.send().await.context("media download failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("could not download media: {status}");
        }
        Ok(response.bytes().await.context("media download was interrupted")?.to_vec())
    }

    async fn upload(&self, media: Vec<u8>) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header("authorization", self.api_key.expose_secret())
            .body(media)
            .send()
            .await
            .context("media upload failed")?
            .error_for_status()
            .context("media upload was rejected")?;
        let upload: UploadResponse = response.json().await.context("invalid upload response")?;
        Ok(upload.upload_url)
    }

    async fn request_transcript(&self, audio_url: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header("authorization", self.api_key.expose_secret())
            .json(&TranscriptRequest { audio_url, language_detection: true })
            .send()
            .await
            .context("transcript request failed")?
            .error_for_status()
            .context("transcript request was rejected")?;
        let job: TranscriptJob = response.json().await.context("invalid transcript response")?;
        Ok(job.id)
    }

    async fn poll(&self, job_id: &str) -> Result<Transcript> {
        let url = format!("{}/v2/transcript/{job_id}", self.base_url);
        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let status: TranscriptStatus = self
                .client
                .get(&url)
                .header("authorization", self.api_key.expose_secret())
                .send()
                .await
                .context("transcript poll failed")?
                .error_for_status()
                .context("transcript poll was rejected")?
                .json()
                .await
                .context("invalid transcript status")?;

            match status.status.as_str() {
                "completed" => {
                    return Ok(Transcript::new(
                        status.text.unwrap_or_default(),
                        status.language_code.unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
                    ));
                }
                "error" => bail!(
                    "transcription failed: {}",
                    status.error.unwrap_or_else(|| "no detail".to_string())
                ),
                _ => {}
            }
        }
        bail!("transcript not ready after {} polls", self.max_polls)
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, media_ref: &str) -> Result<Transcript> {
        let media = self.download(media_ref).await?;
        let audio_url = self.upload(media).await?;
        let job_id = self.request_transcript(&audio_url).await?;
        tracing::debug!(event_name = "transcription.requested", job_id = %job_id);
        let transcript = self.poll(&job_id).await?;
        tracing::info!(
            event_name = "transcription.completed",
            job_id = %job_id,
            language_code = %transcript.language_code,
            chars = transcript.text.chars().count(),
        );
        Ok(transcript)
    }
}

/// `None` when transcription is disabled.
pub fn build_transcriber(config: &TranscriptionConfig) -> Result<Option<HttpTranscriber>> {
    if !config.enabled {
        return Ok(None);
    }
    Ok(Some(HttpTranscriber::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use souq_core::config::TranscriptionConfig;
    use souq_core::Language;

    use super::{HttpTranscriber, Transcriber, Transcript};

    #[test]
    fn usability_and_language() {
        assert!(Transcript::new("show me shoes", "en").is_usable());
        assert!(!Transcript::new("   ", "en").is_usable());
        assert!(!Transcript::new("unknown", "unknown").is_usable());
        assert_eq!(Transcript::new("مرحبا", "ar").language(), Some(Language::Arabic));
        assert_eq!(Transcript::new("hello", "unknown").language(), None);
    }

    #[derive(Clone)]
    struct Stub {
        polls: Arc<AtomicU32>,
        finish_with: &'static str,
    }

    async fn media(headers: HeaderMap) -> Result<Vec<u8>, StatusCode> {
        if headers.get("authorization").is_none() {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(b"voice-note".to_vec())
    }

    async fn upload(headers: HeaderMap, body: axum::body::Bytes) -> Json<Value> {
        assert_eq!(headers.get("authorization").and_then(|v| v.to_str().ok()), Some("key-1"));
        assert_eq!(&body[..], b"voice-note");
        Json(json!({"upload_url": "https://cdn.example/u/1"}))
    }

    async fn transcript(Json(request): Json<Value>) -> Json<Value> {
        assert_eq!(request["language_detection"], json!(true));
        assert_eq!(request["audio_url"], json!("https://cdn.example/u/1"));
        Json(json!({"id": "job-9", "status": "queued"}))
    }

    async fn status(State(stub): State<Stub>, Path(id): Path<String>) -> Json<Value> {
        assert_eq!(id, "job-9");
        let polls = stub.polls.fetch_add(1, Ordering::SeqCst);
        if polls < 1 {
            return Json(json!({"status": "processing"}));
        }
        match stub.finish_with {
            "error" => Json(json!({"status": "error", "error": "audio too short"})),
            _ => Json(json!({"status": "completed", "text": "أريد حذاء", "language_code": "ar"})),
        }
    }

    async fn spawn(stub: Stub) -> String {
        let app = Router::new()
            .route("/media/1", get(media))
            .route("/v2/upload", post(upload))
            .route("/v2/transcript", post(transcript))
            .route("/v2/transcript/{id}", get(status))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    fn config(base_url: &str) -> TranscriptionConfig {
        TranscriptionConfig {
            enabled: true,
            base_url: base_url.to_string(),
            api_key: Some(SecretString::from("key-1")),
            media_username: Some("account".to_string()),
            media_password: Some(SecretString::from("token")),
            poll_interval_ms: 5,
            max_polls: 5,
        }
    }

    #[tokio::test]
    async fn transcribes_after_polling() {
        let stub = Stub { polls: Arc::new(AtomicU32::new(0)), finish_with: "completed" };
        let base = spawn(stub.clone()).await;
        let transcriber = HttpTranscriber::from_config(&config(&base)).expect("client");

        let transcript =
            transcriber.transcribe(&format!("{base}/media/1")).await.expect("transcript");
        assert_eq!(transcript, Transcript::new("أريد حذاء", "ar"));
        assert_eq!(stub.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_error_is_reported() {
        let stub = Stub { polls: Arc::new(AtomicU32::new(0)), finish_with: "error" };
        let base = spawn(stub).await;
        let transcriber = HttpTranscriber::from_config(&config(&base)).expect("client");

        let error = transcriber.transcribe(&format!("{base}/media/1")).await.expect_err("error");
        assert!(error.to_string().contains("audio too short"));
    }
}
