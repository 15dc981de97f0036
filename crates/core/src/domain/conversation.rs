use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::CatalogEntry;
use crate::domain::language::Language;
use crate::flows::states::{Stage, StageFallback};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greet,
    Smalltalk,
    ProductRecommend,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Greet, Intent::Smalltalk, Intent::ProductRecommend];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Greet => "greet",
            Self::Smalltalk => "smalltalk",
            Self::ProductRecommend => "product_recommend",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|intent| intent.label().eq_ignore_ascii_case(label))
    }
}

/// Per-request pipeline state. Owned by a single in-flight request and dropped once the
/// reply has been returned.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationState {
    pub user_id: String,
    pub correlation_id: String,
    pub raw_text: String,
    language: Option<Language>,
    pub intent: Option<Intent>,
    pub extracted_query: Option<String>,
    pub search_results: Option<Vec<CatalogEntry>>,
    pub reply: Option<String>,
    debug_trace: BTreeMap<String, String>,
    fallbacks: Vec<StageFallback>,
}

impl ConversationState {
    pub fn new(
        user_id: impl Into<String>,
        correlation_id: impl Into<String>,
        raw_text: impl Into<String>,
        language: Option<Language>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            correlation_id: correlation_id.into(),
            raw_text: raw_text.into(),
            language,
            intent: None,
            extracted_query: None,
            search_results: None,
            reply: None,
            debug_trace: BTreeMap::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    /// Sets the language unless one is already present. Returns whether it was applied.
    pub fn set_language_once(&mut self, language: Language) -> bool {
        if self.language.is_some() {
            return false;
        }
        self.language = Some(language);
        true
    }

    /// Resolved language, or English before the normalize stage has run.
    pub fn reply_language(&self) -> Language {
        self.language.clone().unwrap_or_default()
    }

    /// Appends a trace value for `key`. Existing keys are never overwritten.
    pub fn record_trace(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.debug_trace.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn debug_trace(&self) -> &BTreeMap<String, String> {
        &self.debug_trace
    }

    pub fn record_fallback(&mut self, fallback: StageFallback) {
        self.fallbacks.push(fallback);
    }

    pub fn fallbacks(&self) -> &[StageFallback] {
        &self.fallbacks
    }

    pub fn fallback_for(&self, stage: Stage) -> Option<&StageFallback> {
        self.fallbacks.iter().find(|fallback| fallback.stage == stage)
    }
}
