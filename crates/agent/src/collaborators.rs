use anyhow::Result;
use async_trait::async_trait;
use souq_core::{CatalogEntry, Intent, Language};

#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, text: &str) -> Result<Language>;
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// `Ok(None)` means the classifier answered but the answer named no known intent.
    async fn classify(&self, text: &str, language: &Language) -> Result<Option<Intent>>;
}

#[async_trait]
pub trait QueryExtractor: Send + Sync {
    async fn extract(&self, text: &str, language: &Language) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct GreetingContext {
    pub text: String,
    pub language: Language,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecommendationContext {
    pub text: String,
    pub query: String,
    pub language: Language,
    pub results: Vec<CatalogEntry>,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn greeting(&self, context: &GreetingContext) -> Result<String>;

    async fn recommendation(&self, context: &RecommendationContext) -> Result<String>;
}
