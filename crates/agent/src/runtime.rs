use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use souq_core::audit::TracingAuditSink;
use souq_core::config::AppConfig;
use souq_core::{
    AuditCategory, AuditContext, AuditOutcome, AuditSink, ConversationFlow, ConversationState,
    FallbackReason, FlowEngine, Intent, Language, Retriever, Stage, StageFallback,
};
use uuid::Uuid;

use crate::collaborators::{
    GreetingContext, IntentClassifier, LanguageDetector, QueryExtractor, RecommendationContext,
    ReplyGenerator,
};
use crate::extraction::{HeuristicQueryExtractor, LlmQueryExtractor};
use crate::fallback::{bounded, StageFailure, StageOutcome};
use crate::intent::{KeywordIntentClassifier, LlmIntentClassifier};
use crate::language::ScriptLanguageDetector;
use crate::llm::build_llm_client;
use crate::prompts::PromptLibrary;
use crate::replies::{self, LlmReplyGenerator, TemplateReplyGenerator};

const TRACE_INPUT_CHARS: usize = 120;

#[derive(Clone, Debug, PartialEq)]
pub struct AgentSettings {
    pub top_k: usize,
    pub stage_timeout: Duration,
    pub default_language: Language,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.index.top_k,
            stage_timeout: Duration::from_secs(config.agent.stage_timeout_secs),
            default_language: Language::from_code(&config.agent.default_language),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            stage_timeout: Duration::from_secs(20),
            default_language: Language::English,
        }
    }
}

/// Everything the stage graph calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn LanguageDetector>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn QueryExtractor>,
    pub retriever: Arc<dyn Retriever>,
    pub replies: Arc<dyn ReplyGenerator>,
}

impl Collaborators {
    /// Script detection, keyword intents, heuristic extraction and template replies.
    pub fn offline(retriever: Arc<dyn Retriever>, default_language: Language) -> Self {
        Self {
            detector: Arc::new(ScriptLanguageDetector::new(default_language)),
            classifier: Arc::new(KeywordIntentClassifier),
            extractor: Arc::new(HeuristicQueryExtractor),
            retriever,
            replies: Arc::new(TemplateReplyGenerator),
        }
    }

    /// LLM-backed collaborators when `llm.provider` is set, offline ones otherwise.
    pub fn from_config(config: &AppConfig, retriever: Arc<dyn Retriever>) -> Result<Self> {
        let default_language = Language::from_code(&config.agent.default_language);
        let Some(llm) = build_llm_client(&config.llm)? else {
            return Ok(Self::offline(retriever, default_language));
        };
        let prompts = Arc::new(PromptLibrary::new()?);
        Ok(Self {
            detector: Arc::new(ScriptLanguageDetector::new(default_language)),
            classifier: Arc::new(LlmIntentClassifier::new(llm.clone(), prompts.clone())),
            extractor: Arc::new(LlmQueryExtractor::new(llm.clone(), prompts.clone())),
            retriever,
            replies: Arc::new(LlmReplyGenerator::new(llm, prompts)),
        })
    }
}

/// Runs one message through the stage graph.
///
/// Stages run strictly in sequence and no lock is held across a collaborator call. Each call
/// is bounded by `stage_timeout`; errors, timeouts and unusable answers are replaced by the
/// stage's fallback value and recorded on the state, so [`AgentRuntime::run`] cannot fail.
pub struct AgentRuntime {
    collaborators: Collaborators,
    settings: AgentSettings,
    engine: FlowEngine<ConversationFlow>,
    audit: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(collaborators: Collaborators, settings: AgentSettings) -> Self {
        Self {
            collaborators,
            settings,
            engine: FlowEngine::default(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Runs `text` for `user_id` and returns the reply.
    pub async fn run_message(
        &self,
        user_id: &str,
        text: &str,
        language: Option<Language>,
    ) -> String {
        let state = ConversationState::new(user_id, Uuid::new_v4().to_string(), text, language);
        let state = self.run(state).await;
        let reply_language = state.reply_language();
        state.reply.unwrap_or_else(|| replies::search_error(&reply_language).to_string())
    }

    pub async fn run(&self, mut state: ConversationState) -> ConversationState {
        let audit = AuditContext::new(&state.user_id, &state.correlation_id, "agent");
        let mut stage = self.engine.initial_stage();

        while !stage.is_terminal() {
            let failure = self.execute(stage, &mut state).await;
            self.record(stage, failure, &mut state, &audit);

            match self.engine.apply_with_audit(stage, state.intent, self.audit.as_ref(), &audit) {
                Ok(outcome) => stage = outcome.to,
                Err(error) => {
                    tracing::error!(
                        event_name = "agent.flow.rejected",
                        correlation_id = %state.correlation_id,
                        stage = stage.name(),
                        error = %error,
                    );
                    break;
                }
            }
        }

        let has_reply = state.reply.as_deref().is_some_and(|reply| !reply.trim().is_empty());
        if !has_reply {
            let language = state.reply_language();
            state.reply = Some(replies::search_error(&language).to_string());
            self.record(
                Stage::End,
                Some(StageFailure::new(FallbackReason::PipelineError, "run ended without a reply")),
                &mut state,
                &audit,
            );
        }

        tracing::info!(
            event_name = "agent.run.completed",
            correlation_id = %state.correlation_id,
            user_id = %state.user_id,
            intent = state.intent.map(|intent| intent.label()).unwrap_or("none"),
            fallbacks = state.fallbacks().len(),
        );
        state
    }

    async fn execute(&self, stage: Stage, state: &mut ConversationState) -> Option<StageFailure> {
        match stage {
            Stage::Normalize => self.normalize(state).await,
            Stage::ClassifyIntent => self.classify(state).await,
            Stage::ExtractQuery => self.extract(state).await,
            Stage::Retrieve => self.retrieve(state).await,
            Stage::ComposeRecommendation => self.compose_recommendation(state).await,
            Stage::ComposeGreeting => self.compose_greeting(state).await,
            Stage::End => None,
        }
    }

    async fn normalize(&self, state: &mut ConversationState) -> Option<StageFailure> {
        if let Some(language) = state.language() {
            let code = language.code().to_string();
            state.record_trace(Stage::Normalize.name(), format!("{code} (provided)"));
            return None;
        }

        let outcome = match bounded(
            self.settings.stage_timeout,
            self.collaborators.detector.detect(&state.raw_text),
        )
        .await
        {
            Ok(language) => StageOutcome::Completed(language),
            Err(failure) => {
                StageOutcome::Fallback { value: self.settings.default_language.clone(), failure }
            }
        };
        state.record_trace(Stage::Normalize.name(), outcome.value().code());
        let failure = outcome.failure().cloned();
        state.set_language_once(outcome.into_value());
        failure
    }

    async fn classify(&self, state: &mut ConversationState) -> Option<StageFailure> {
        let language = state.reply_language();
        let outcome = match bounded(
            self.settings.stage_timeout,
            self.collaborators.classifier.classify(&state.raw_text, &language),
        )
        .await
        {
            Ok(Some(intent)) => StageOutcome::Completed(intent),
            Ok(None) => StageOutcome::Fallback {
                value: Intent::ProductRecommend,
                failure: StageFailure::new(
                    FallbackReason::AmbiguousOutput,
                    "no known intent label",
                ),
            },
            Err(failure) => StageOutcome::Fallback { value: Intent::ProductRecommend, failure },
        };
        state.record_trace(Stage::ClassifyIntent.name(), outcome.value().label());
        let failure = outcome.failure().cloned();
        state.intent = Some(outcome.into_value());
        failure
    }

    async fn extract(&self, state: &mut ConversationState) -> Option<StageFailure> {
        let language = state.reply_language();
        let outcome = match bounded(
            self.settings.stage_timeout,
            self.collaborators.extractor.extract(&state.raw_text, &language),
        )
        .await
        {
            Ok(query) if !query.trim().is_empty() => {
                StageOutcome::Completed(query.trim().to_string())
            }
            Ok(_) => StageOutcome::Fallback {
                value: state.raw_text.clone(),
                failure: StageFailure::new(
                    FallbackReason::EmptyOutput,
                    "extractor returned no query",
                ),
            },
            Err(failure) => StageOutcome::Fallback { value: state.raw_text.clone(), failure },
        };
        state.record_trace(Stage::ExtractQuery.name(), outcome.value().as_str());
        let failure = outcome.failure().cloned();
        state.extracted_query = Some(outcome.into_value());
        failure
    }

    async fn retrieve(&self, state: &mut ConversationState) -> Option<StageFailure> {
        let query = state.extracted_query.clone().unwrap_or_else(|| state.raw_text.clone());
        let retriever = &self.collaborators.retriever;
        let top_k = self.settings.top_k;
        let result = bounded(self.settings.stage_timeout, async {
            retriever.search(&query, top_k).await.map_err(anyhow::Error::from)
        })
        .await;

        match result {
            Ok(results) => {
                state.record_trace(Stage::Retrieve.name(), format!("{} results", results.len()));
                state.search_results = Some(results);
                None
            }
            Err(failure) => {
                state.record_trace(Stage::Retrieve.name(), "failed");
                Some(failure)
            }
        }
    }

    async fn compose_recommendation(&self, state: &mut ConversationState) -> Option<StageFailure> {
        let language = state.reply_language();
        let Some(results) = state.search_results.clone() else {
            state.reply = Some(replies::search_error(&language).to_string());
            return Some(StageFailure::new(
                FallbackReason::PipelineError,
                "no search results to compose",
            ));
        };

        let context = RecommendationContext {
            text: state.raw_text.clone(),
            query: state.extracted_query.clone().unwrap_or_default(),
            language: language.clone(),
            results,
        };
        let timeout = self.settings.stage_timeout;
        let generated = bounded(timeout, self.collaborators.replies.recommendation(&context)).await;
        let outcome = compose(generated, replies::search_error(&language));
        let failure = outcome.failure().cloned();
        state.reply = Some(outcome.into_value());
        failure
    }

    async fn compose_greeting(&self, state: &mut ConversationState) -> Option<StageFailure> {
        let language = state.reply_language();
        let context = GreetingContext { text: state.raw_text.clone(), language: language.clone() };
        let timeout = self.settings.stage_timeout;
        let generated = bounded(timeout, self.collaborators.replies.greeting(&context)).await;
        let outcome = compose(generated, replies::greeting(&language));
        let failure = outcome.failure().cloned();
        state.reply = Some(outcome.into_value());
        failure
    }

    fn record(
        &self,
        stage: Stage,
        failure: Option<StageFailure>,
        state: &mut ConversationState,
        audit: &AuditContext,
    ) {
        match failure {
            None => self.audit.emit(
                audit
                    .event(
                        "conversation.stage_completed",
                        AuditCategory::Stage,
                        AuditOutcome::Success,
                    )
                    .with_metadata("stage", stage.name()),
            ),
            Some(failure) => {
                tracing::warn!(
                    event_name = "agent.stage.fallback",
                    correlation_id = %state.correlation_id,
                    stage = stage.name(),
                    reason = failure.reason.reason_code(),
                    input = %preview(&state.raw_text),
                    error = %failure.detail,
                    "stage fell back"
                );
                self.audit.emit(
                    audit
                        .event(
                            "conversation.stage_fallback",
                            AuditCategory::Stage,
                            AuditOutcome::Fallback,
                        )
                        .with_metadata("stage", stage.name())
                        .with_metadata("reason", failure.reason.reason_code()),
                );
                state.record_fallback(StageFallback {
                    stage,
                    reason: failure.reason,
                    detail: failure.detail,
                });
            }
        }
    }
}

fn compose(result: Result<String, StageFailure>, canned: &str) -> StageOutcome<String> {
    match result {
        Ok(reply) if !reply.trim().is_empty() => StageOutcome::Completed(reply),
        Ok(_) => StageOutcome::Fallback {
            value: canned.to_string(),
            failure: StageFailure::new(
                FallbackReason::EmptyOutput,
                "generator returned a blank reply",
            ),
        },
        Err(failure) => StageOutcome::Fallback { value: canned.to_string(), failure },
    }
}

fn preview(text: &str) -> String {
    text.chars().take(TRACE_INPUT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use souq_core::audit::InMemoryAuditSink;
    use souq_core::{
        CatalogEntry, ConversationState, FallbackReason, Language, RetrievalError, Retriever, Stage,
    };

    use super::{AgentRuntime, AgentSettings, Collaborators};

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

    fn runtime(sink: Arc<InMemoryAuditSink>) -> AgentRuntime {
        AgentRuntime::new(
            Collaborators::offline(Arc::new(NoResults), Language::English),
            AgentSettings::default(),
        )
        .with_audit_sink(sink)
    }

    #[tokio::test]
    async fn offline_greeting_path_emits_one_event_per_stage() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let state = runtime(sink.clone())
            .run(ConversationState::new("u-1", "c-1", "hello", None))
            .await;

        assert_eq!(
            state.reply.as_deref(),
            Some("Hello! I'm your shopping assistant. How can I help you today?")
        );
        let stages: Vec<String> = sink
            .events()
            .into_iter()
            .filter(|event| event.event_type.starts_with("conversation.stage_"))
            .filter_map(|event| event.metadata.get("stage").cloned())
            .collect();
        assert_eq!(stages, vec!["normalize", "classify_intent", "compose_greeting"]);
        assert_eq!(state.debug_trace().get("normalize").map(String::as_str), Some("en"));
    }

    #[tokio::test]
    async fn offline_product_path_without_matches_replies_no_results() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let state = runtime(sink)
            .run(ConversationState::new("u-1", "c-2", "أريد حذاء رياضي", None))
            .await;

        assert_eq!(state.language(), Some(&Language::Arabic));
        assert_eq!(state.extracted_query.as_deref(), Some("حذاء رياضي"));
        assert_eq!(state.reply.as_deref(), Some("عذراً، لم أجد منتجات مطابقة لطلبك."));
        assert!(state.fallbacks().is_empty());
        assert!(state.fallback_for(Stage::Retrieve).is_none());
    }

    #[tokio::test]
    async fn bare_request_searches_with_the_raw_text() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let state = runtime(sink).run(ConversationState::new("u-1", "c-3", "show me", None)).await;

        assert_eq!(state.extracted_query.as_deref(), Some("show me"));
        assert_eq!(
            state.fallback_for(Stage::ExtractQuery).map(|fallback| fallback.reason),
            Some(FallbackReason::EmptyOutput)
        );
        assert_eq!(
            state.reply.as_deref(),
            Some("Sorry, I couldn't find any products matching your request.")
        );
    }
}
