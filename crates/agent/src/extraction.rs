use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use souq_core::Language;

use crate::collaborators::QueryExtractor;
use crate::language::is_arabic_letter;
use crate::llm::LlmClient;
use crate::prompts::{PromptLibrary, TextPrompt, EXTRACT_QUERY_TEMPLATE};

const LEADING_PHRASES: &[&str] = &[
    "please show",
    "can you show",
    "show",
    "find",
    "recommend",
    "i want",
    "i need",
    "i'm looking for",
    "im looking for",
    "looking for",
    "أرني",
    "ارني",
    "ابحث عن",
    "ابحث",
    "أريد",
    "اريد",
    "أحتاج",
    "احتاج",
];

const TRAILING_PHRASES: &[&str] = &["please", "من فضلك", "لو سمحت"];

/// Rule-based query extraction: drops request phrasing and punctuation.
#[derive(Clone, Debug, Default)]
pub struct HeuristicQueryExtractor;

impl HeuristicQueryExtractor {
    pub fn extract_text(&self, text: &str) -> String {
        let lowered = text.trim().to_lowercase();
        let mut query = strip_leading(&lowered);
        query = strip_trailing(query);
        let cleaned: String =
            query.chars().map(|ch| if keep_char(ch) { ch } else { ' ' }).collect();
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl QueryExtractor for HeuristicQueryExtractor {
    async fn extract(&self, text: &str, _language: &Language) -> Result<String> {
        Ok(self.extract_text(text))
    }
}

fn strip_leading(text: &str) -> &str {
    for phrase in LEADING_PHRASES {
        if let Some(rest) = text.strip_prefix(phrase) {
            if rest.starts_with(char::is_whitespace) {
                let rest = rest.trim_start();
                if rest.trim_end_matches(|ch: char| !ch.is_alphanumeric()) == "me" {
                    return "";
                }
                return rest.strip_prefix("me ").map(str::trim_start).unwrap_or(rest);
            }
        }
    }
    text
}

fn strip_trailing(text: &str) -> &str {
    let trimmed = text.trim_end_matches(|ch: char| ch.is_whitespace() || ch.is_ascii_punctuation());
    for phrase in TRAILING_PHRASES {
        if let Some(rest) = trimmed.strip_suffix(phrase) {
            if rest.is_empty() || rest.ends_with(|ch: char| !ch.is_alphanumeric()) {
                return rest;
            }
        }
    }
    text
}

fn keep_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-' || ch.is_whitespace() || is_arabic_letter(ch)
}

/// Asks the model for a search phrase; falls back to the heuristic cleanup when the model
/// answers with nothing usable.
pub struct LlmQueryExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl LlmQueryExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl QueryExtractor for LlmQueryExtractor {
    async fn extract(&self, text: &str, language: &Language) -> Result<String> {
        let prompt = self
            .prompts
            .render(EXTRACT_QUERY_TEMPLATE, &TextPrompt { text, language: language.code() })?;
        let answer = self.llm.complete(&prompt).await?;
        let answer = answer.trim().trim_matches(|ch| ch == '"' || ch == '\'').trim();
        Ok(HeuristicQueryExtractor.extract_text(answer))
    }
}
