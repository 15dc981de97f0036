//! Conversation runtime for the shopping assistant.
//!
//! An inbound message is turned into text (transcribing voice notes first), then run
//! through a fixed stage graph:
//!
//! 1. **normalize** tags the language unless the caller already knows it
//! 2. **classify_intent** picks greet, smalltalk or product_recommend
//! 3. greetings and smalltalk go straight to **compose_greeting**
//! 4. product requests run **extract_query**, **retrieve** and **compose_recommendation**
//!
//! Every external collaborator sits behind a trait in [`collaborators`] and every call is
//! bounded by a timeout. A failing collaborator never fails the request: the stage records a
//! [`souq_core::StageFallback`] and continues with its deterministic fallback value, so a
//! run always ends with a non-empty reply.

pub mod catalog;
pub mod collaborators;
pub mod embedding;
pub mod extraction;
pub mod fallback;
pub mod inbound;
pub mod intent;
pub mod language;
pub mod llm;
pub mod prompts;
pub mod replies;
pub mod runtime;
pub mod transcription;

pub use collaborators::{
    GreetingContext, IntentClassifier, LanguageDetector, QueryExtractor, RecommendationContext,
    ReplyGenerator,
};
pub use inbound::{InboundHandler, InboundMessage, InboundOutcome};
pub use runtime::{AgentRuntime, AgentSettings, Collaborators};
pub use transcription::{Transcriber, Transcript};
