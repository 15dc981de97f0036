pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod retrieval;
pub mod transcripts;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use catalog::{CatalogError, CatalogSource, CatalogStore, JsonFileCatalogSource};
pub use domain::catalog::{CatalogEntry, ProductId};
pub use domain::conversation::{ConversationState, Intent};
pub use domain::language::Language;
pub use errors::{ApplicationError, InterfaceError};
pub use flows::{ConversationFlow, FallbackReason, FlowEngine, Route, Stage, StageFallback};
pub use retrieval::{
    Embedder, EmbeddingError, EmbeddingVector, FlatIndex, HashingEmbedder, IndexStore,
    RetrievalError, RetrievalService, Retriever,
};
pub use transcripts::{TranscriptLog, TranscriptLogError, TranscriptRecord};
