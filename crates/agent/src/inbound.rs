use std::sync::Arc;

use souq_core::{ConversationState, Language, TranscriptLog, TranscriptRecord};
use uuid::Uuid;

use crate::replies;
use crate::runtime::AgentRuntime;
use crate::transcription::Transcriber;

/// A decoded chat message: text, a voice-note reference, or both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InboundMessage {
    pub user_id: String,
    pub body: String,
    pub media_ref: Option<String>,
    pub language_hint: Option<Language>,
}

impl InboundMessage {
    pub fn text(user_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), body: body.into(), ..Self::default() }
    }

    pub fn voice(user_id: impl Into<String>, media_ref: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), media_ref: Some(media_ref.into()), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InboundOutcome {
    pub reply: String,
    pub correlation_id: String,
    pub transcribed: bool,
    /// No stage ran because the input could not be used.
    pub short_circuited: bool,
}

/// Turns an inbound message into pipeline input and runs it.
///
/// Voice notes are transcribed first and the transcript's language wins over any hint.
/// Input that is still unusable afterwards gets the please-resend reply without running the
/// pipeline.
pub struct InboundHandler {
    runtime: Arc<AgentRuntime>,
    transcriber: Option<Arc<dyn Transcriber>>,
    transcripts: Arc<dyn TranscriptLog>,
}

impl InboundHandler {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        transcriber: Option<Arc<dyn Transcriber>>,
        transcripts: Arc<dyn TranscriptLog>,
    ) -> Self {
        Self { runtime, transcriber, transcripts }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub async fn handle(&self, message: InboundMessage) -> InboundOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        let mut language = message.language_hint.clone();
        let mut text = message.body.trim().to_string();
        let mut transcribed = false;

        let media_ref = message.media_ref.as_deref().filter(|media| !media.trim().is_empty());
        if let Some(media_ref) = media_ref {
            transcribed = true;
            match self.transcribe(&message.user_id, &correlation_id, media_ref).await {
                Some((transcript_text, transcript_language)) => {
                    text = transcript_text;
                    if transcript_language.is_some() {
                        language = transcript_language;
                    }
                }
                None => text.clear(),
            }
        }

        if text.is_empty() {
            tracing::info!(
                event_name = "agent.inbound.unusable",
                correlation_id = %correlation_id,
                user_id = %message.user_id,
                transcribed,
            );
            let reply_language = language.unwrap_or_default();
            return InboundOutcome {
                reply: replies::resend(&reply_language).to_string(),
                correlation_id,
                transcribed,
                short_circuited: true,
            };
        }

        let state = ConversationState::new(&message.user_id, &correlation_id, text, language);
        let state = self.runtime.run(state).await;
        let reply_language = state.reply_language();
        let reply =
            state.reply.unwrap_or_else(|| replies::search_error(&reply_language).to_string());
        InboundOutcome { reply, correlation_id, transcribed, short_circuited: false }
    }

    async fn transcribe(
        &self,
        user_id: &str,
        correlation_id: &str,
        media_ref: &str,
    ) -> Option<(String, Option<Language>)> {
        let Some(transcriber) = &self.transcriber else {
            tracing::warn!(
                event_name = "agent.inbound.transcription_disabled",
                correlation_id = %correlation_id,
                "voice note received but transcription is disabled"
            );
            return None;
        };

        let transcript = match transcriber.transcribe(media_ref).await {
            Ok(transcript) => transcript,
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.inbound.transcription_failed",
                    correlation_id = %correlation_id,
                    error = %format!("{error:#}"),
                );
                return None;
            }
        };
        if !transcript.is_usable() {
            return None;
        }

        let record = TranscriptRecord::new(user_id, transcript.text.trim());
        if let Err(error) = self.transcripts.append(&record).await {
            tracing::warn!(
                event_name = "agent.inbound.transcript_log_failed",
                correlation_id = %correlation_id,
                error = %error,
            );
        }
        Some((transcript.text.trim().to_string(), transcript.language()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use souq_core::transcripts::InMemoryTranscriptLog;
    use souq_core::{CatalogEntry, Language, RetrievalError, Retriever, TranscriptLog};

    use super::{InboundHandler, InboundMessage};
    use crate::runtime::{AgentRuntime, AgentSettings, Collaborators};
    use crate::transcription::{Transcriber, Transcript};

    struct NoResults;

    #[async_trait]
    impl Retriever for NoResults {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<CatalogEntry>, RetrievalError> {
            Ok(Vec::new())
        }
    }

    struct FixedTranscriber(Transcript);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _media_ref: &str) -> anyhow::Result<Transcript> {
            Ok(self.0.clone())
        }
    }

    fn handler(transcript: Option<Transcript>, log: Arc<InMemoryTranscriptLog>) -> InboundHandler {
        let runtime = AgentRuntime::new(
            Collaborators::offline(Arc::new(NoResults), Language::English),
            AgentSettings::default(),
        );
        let transcriber = transcript
            .map(|transcript| Arc::new(FixedTranscriber(transcript)) as Arc<dyn Transcriber>);
        InboundHandler::new(Arc::new(runtime), transcriber, log)
    }

    #[tokio::test]
    async fn voice_note_is_logged_and_answered_in_its_language() {
        let log = Arc::new(InMemoryTranscriptLog::new());
        let handler = handler(Some(Transcript::new("مرحبا", "ar")), log.clone());

        let mut message = InboundMessage::voice("whatsapp:+971500000000", "https://media/1");
        message.language_hint = Some(Language::English);
        let outcome = handler.handle(message).await;

        assert!(outcome.transcribed);
        assert!(!outcome.short_circuited);
        assert!(outcome.reply.starts_with("مرحباً!"));
        let recent = log.recent(10).await.expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "مرحبا");
    }

    #[tokio::test]
    async fn unknown_transcript_short_circuits() {
        let log = Arc::new(InMemoryTranscriptLog::new());
        let handler = handler(Some(Transcript::new("unknown", "unknown")), log.clone());

        let outcome = handler.handle(InboundMessage::voice("u-2", "https://media/2")).await;

        assert!(outcome.short_circuited);
        assert_eq!(
            outcome.reply,
            "Sorry, I couldn't read that. Can you please send a text or voice message again?"
        );
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn voice_note_without_transcriber_short_circuits() {
        let log = Arc::new(InMemoryTranscriptLog::new());
        let handler = handler(None, log);

        let outcome = handler.handle(InboundMessage::voice("u-3", "https://media/3")).await;
        assert!(outcome.transcribed);
        assert!(outcome.short_circuited);
    }
}
