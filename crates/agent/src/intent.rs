use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use souq_core::{Intent, Language};

use crate::collaborators::IntentClassifier;
use crate::llm::LlmClient;
use crate::prompts::{PromptLibrary, TextPrompt, INTENT_TEMPLATE};

/// Label scan order; the first label contained in the answer wins.
const LABEL_ORDER: [Intent; 3] = [Intent::Greet, Intent::ProductRecommend, Intent::Smalltalk];

/// Reads an intent out of free-form classifier output.
pub fn parse_intent_label(output: &str) -> Option<Intent> {
    let lowered = output.trim().to_lowercase();
    LABEL_ORDER.into_iter().find(|intent| lowered.contains(intent.label()))
}

pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str, language: &Language) -> Result<Option<Intent>> {
        if text.trim().is_empty() {
            return Ok(Some(Intent::Smalltalk));
        }
        let prompt = self
            .prompts
            .render(INTENT_TEMPLATE, &TextPrompt { text, language: language.code() })?;
        let answer = self.llm.complete(&prompt).await?;
        Ok(parse_intent_label(&answer))
    }
}

const GREETING_PHRASES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "hiya",
    "good morning",
    "good afternoon",
    "good evening",
    "salam",
    "salaam",
    "مرحبا",
    "مرحباً",
    "اهلا",
    "أهلا",
    "أهلاً",
    "هلا",
    "السلام عليكم",
    "صباح الخير",
    "مساء الخير",
];

const GREETING_FILLER: &[&str] = &["there", "all", "everyone", "friend", "team", "bot", "يا"];

const SMALLTALK_PHRASES: &[&str] = &[
    "how are you",
    "thank you",
    "thanks",
    "who are you",
    "what can you do",
    "bye",
    "goodbye",
    "كيف حالك",
    "شكرا",
    "شكراً",
    "من أنت",
    "مع السلامة",
];

const PRODUCT_CUES: &[&str] = &[
    "show",
    "find",
    "recommend",
    "want",
    "need",
    "buy",
    "looking for",
    "search",
    "price",
    "أرني",
    "ابحث",
    "أريد",
    "اريد",
    "أحتاج",
    "احتاج",
    "اشتري",
    "سعر",
];

/// Offline classifier used when no LLM is configured.
///
/// Product cues win over greetings ("hi, show me shoes" is a product request); a message
/// that is nothing but greeting or smalltalk phrases is routed accordingly; anything else
/// is treated as a product request.
#[derive(Clone, Debug, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn classify_text(&self, text: &str) -> Intent {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Intent::Smalltalk;
        }

        if PRODUCT_CUES.iter().any(|cue| contains_phrase(&normalized, cue)) {
            return Intent::ProductRecommend;
        }
        if GREETING_PHRASES.iter().any(|phrase| starts_with_phrase(&normalized, phrase)) {
            let rest = strip_phrases(&normalized, GREETING_PHRASES);
            let only_filler = rest.split_whitespace().all(|word| GREETING_FILLER.contains(&word));
            let smalltalk = SMALLTALK_PHRASES.iter().any(|phrase| contains_phrase(&rest, phrase));
            if only_filler || smalltalk {
                return Intent::Greet;
            }
        }
        if SMALLTALK_PHRASES.iter().any(|phrase| contains_phrase(&normalized, phrase)) {
            return Intent::Smalltalk;
        }
        Intent::ProductRecommend
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str, _language: &Language) -> Result<Option<Intent>> {
        Ok(Some(self.classify_text(text)))
    }
}

fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch.is_whitespace() { ch } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let padded = format!(" {normalized} ");
    padded.contains(&format!(" {phrase} "))
}

fn starts_with_phrase(normalized: &str, phrase: &str) -> bool {
    normalized == phrase || normalized.starts_with(&format!("{phrase} "))
}

fn strip_phrases(normalized: &str, phrases: &[&str]) -> String {
    let mut rest = normalized.to_string();
    loop {
        let before = rest.len();
        for phrase in phrases {
            if starts_with_phrase(&rest, phrase) {
                rest = rest[phrase.len()..].trim_start().to_string();
            }
        }
        if rest.len() == before {
            return rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use souq_core::{Intent, Language};

    use super::{parse_intent_label, KeywordIntentClassifier, LlmIntentClassifier};
    use crate::collaborators::IntentClassifier;
    use crate::llm::LlmClient;
    use crate::prompts::PromptLibrary;

    #[test]
    fn labels_are_scanned_in_fixed_order() {
        assert_eq!(parse_intent_label("greet"), Some(Intent::Greet));
        assert_eq!(parse_intent_label(" Product_Recommend.\n"), Some(Intent::ProductRecommend));
        assert_eq!(parse_intent_label("'smalltalk'"), Some(Intent::Smalltalk));
        assert_eq!(parse_intent_label("smalltalk or greet"), Some(Intent::Greet));
        assert_eq!(parse_intent_label("I am not sure"), None);
        assert_eq!(parse_intent_label(""), None);
    }

    #[test]
    fn keyword_classifier_covers_common_messages() {
        let classifier = KeywordIntentClassifier;
        let cases = [
            ("Hello!", Intent::Greet),
            ("hi there", Intent::Greet),
            ("hi, how are you?", Intent::Greet),
            ("مرحبا", Intent::Greet),
            ("السلام عليكم", Intent::Greet),
            ("thanks a lot", Intent::Smalltalk),
            ("شكرا", Intent::Smalltalk),
            ("", Intent::Smalltalk),
            ("hi, show me red shoes", Intent::ProductRecommend),
            ("I need a laptop bag", Intent::ProductRecommend),
            ("أريد حذاء رياضي", Intent::ProductRecommend),
            ("wireless earbuds", Intent::ProductRecommend),
        ];
        for (text, expected) in cases {
            assert_eq!(classifier.classify_text(text), expected, "text: {text}");
        }
    }

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn llm_classifier_parses_answers_and_short_circuits_empty_text() {
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        let classifier =
            LlmIntentClassifier::new(Arc::new(FixedLlm("Intent: greet")), prompts.clone());
        assert_eq!(
            classifier.classify("hey", &Language::English).await.expect("classify"),
            Some(Intent::Greet)
        );
        assert_eq!(
            classifier.classify("   ", &Language::English).await.expect("classify"),
            Some(Intent::Smalltalk)
        );

        let unsure = LlmIntentClassifier::new(Arc::new(FixedLlm("no idea")), prompts);
        assert_eq!(unsure.classify("hmm", &Language::English).await.expect("classify"), None);
    }
}
