use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use souq_core::{CatalogEntry, Language};

use crate::collaborators::{GreetingContext, RecommendationContext, ReplyGenerator};
use crate::llm::LlmClient;
use crate::prompts::{
    ProductLine, PromptLibrary, RecommendationPrompt, TextPrompt, GREETING_TEMPLATE,
    RECOMMENDATION_TEMPLATE,
};

pub fn greeting(language: &Language) -> &'static str {
    if language.is_arabic() {
        "مرحباً! أنا مساعد التسوق الخاص بك. كيف يمكنني مساعدتك اليوم؟"
    } else {
        "Hello! I'm your shopping assistant. How can I help you today?"
    }
}

pub fn search_error(language: &Language) -> &'static str {
    if language.is_arabic() {
        "عذراً، حدث خطأ في البحث عن المنتجات. يرجى المحاولة مرة أخرى."
    } else {
        "Sorry, there was an error searching for products. Please try again."
    }
}

pub fn no_results(language: &Language) -> &'static str {
    if language.is_arabic() {
        "عذراً، لم أجد منتجات مطابقة لطلبك."
    } else {
        "Sorry, I couldn't find any products matching your request."
    }
}

pub fn resend(language: &Language) -> &'static str {
    if language.is_arabic() {
        "عذراً، لم أتمكن من قراءة ذلك. هل يمكنك إرسال رسالة نصية أو صوتية مرة أخرى؟"
    } else {
        "Sorry, I couldn't read that. Can you please send a text or voice message again?"
    }
}

fn results_header(language: &Language, count: usize) -> String {
    if language.is_arabic() {
        format!("إليك {count} منتجات قد تعجبك:")
    } else {
        format!("Here are {count} products you might like:")
    }
}

pub fn format_product(entry: &CatalogEntry, language: &Language) -> String {
    let mut out = format!("🛍️ **{}**", entry.display_name.trim());
    if let Some(brand) = entry.brand.as_deref().filter(|brand| !brand.trim().is_empty()) {
        if language.is_arabic() {
            out.push_str(&format!(" من {}", brand.trim()));
        } else {
            out.push_str(&format!(" by {}", brand.trim()));
        }
    }

    match (&entry.price, language.is_arabic()) {
        (Some(price), false) => out.push_str(&format!("\n💰 Price: {price} {}", entry.currency)),
        (Some(price), true) => out.push_str(&format!("\n💰 السعر: {price} {}", entry.currency)),
        (None, false) => out.push_str("\n💰 Price: not available"),
        (None, true) => out.push_str("\n💰 السعر: غير متوفر"),
    }

    let description = entry.description.trim();
    if !description.is_empty() {
        out.push_str(&format!("\n📝 {description}"));
    }
    if let Some(url) = entry.product_url.as_deref().filter(|url| !url.trim().is_empty()) {
        let label = if language.is_arabic() { "عرض المنتج" } else { "View Product" };
        out.push_str(&format!("\n🔗 [{label}]({})", url.trim()));
    }
    out
}

/// Numbered product list under a localized header; the no-results text when `results` is empty.
pub fn format_recommendations(results: &[CatalogEntry], language: &Language) -> String {
    if results.is_empty() {
        return no_results(language).to_string();
    }
    let items = results
        .iter()
        .enumerate()
        .map(|(position, entry)| format!("{}. {}", position + 1, format_product(entry, language)))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n\n{items}", results_header(language, results.len()))
}

/// Deterministic replies; the default when no LLM is configured.
#[derive(Clone, Debug, Default)]
pub struct TemplateReplyGenerator;

#[async_trait]
impl ReplyGenerator for TemplateReplyGenerator {
    async fn greeting(&self, context: &GreetingContext) -> Result<String> {
        Ok(greeting(&context.language).to_string())
    }

    async fn recommendation(&self, context: &RecommendationContext) -> Result<String> {
        Ok(format_recommendations(&context.results, &context.language))
    }
}

/// Model-written greetings, and a model-written intro above the deterministic product list.
pub struct LlmReplyGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl LlmReplyGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl ReplyGenerator for LlmReplyGenerator {
    async fn greeting(&self, context: &GreetingContext) -> Result<String> {
        let prompt = self.prompts.render(
            GREETING_TEMPLATE,
            &TextPrompt { text: &context.text, language: context.language.code() },
        )?;
        let reply = self.llm.complete(&prompt).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            bail!("model returned an empty greeting");
        }
        Ok(reply.to_string())
    }

    async fn recommendation(&self, context: &RecommendationContext) -> Result<String> {
        if context.results.is_empty() {
            return Ok(no_results(&context.language).to_string());
        }
        let products = context
            .results
            .iter()
            .map(|entry| ProductLine { name: &entry.display_name, brand: entry.brand.as_deref() })
            .collect();
        let prompt = self.prompts.render(
            RECOMMENDATION_TEMPLATE,
            &RecommendationPrompt {
                text: &context.text,
                query: &context.query,
                language: context.language.code(),
                products,
            },
        )?;
        let intro = self.llm.complete(&prompt).await?;
        let list = format_recommendations(&context.results, &context.language);
        let intro = intro.trim();
        if intro.is_empty() {
            return Ok(list);
        }
        Ok(format!("{intro}\n\n{list}"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use souq_core::{CatalogEntry, Language, ProductId};

    use super::{format_product, format_recommendations, LlmReplyGenerator, TemplateReplyGenerator};
    use crate::collaborators::{GreetingContext, RecommendationContext, ReplyGenerator};
    use crate::llm::LlmClient;
    use crate::prompts::PromptLibrary;

    fn entry(name: &str, brand: Option<&str>, price: Option<Decimal>) -> CatalogEntry {
        CatalogEntry {
            product_id: ProductId(format!("id-{name}")),
            language: Language::English,
            display_name: name.to_string(),
            description: "Comfortable and light".to_string(),
            price,
            currency: "AED".to_string(),
            category: None,
            brand: brand.map(str::to_string),
            media_url: None,
            product_url: Some("https://shop.example/p/1".to_string()),
        }
    }

    #[test]
    fn product_block_lists_brand_price_description_and_link() {
        let block = format_product(
            &entry("Red Shoes", Some("Acme"), Some(Decimal::new(19999, 2))),
            &Language::English,
        );
        assert_eq!(
            block,
            "🛍️ **Red Shoes** by Acme\n💰 Price: 199.99 AED\n📝 Comfortable and light\n🔗 [View Product](https://shop.example/p/1)"
        );
    }

    #[test]
    fn recommendation_list_is_numbered_under_header() {
        let results = vec![entry("Red Shoes", None, None), entry("Blue Shoes", None, None)];
        let reply = format_recommendations(&results, &Language::English);
        assert!(reply.starts_with("Here are 2 products you might like:\n\n1. 🛍️ **Red Shoes**"));
        assert!(reply.contains("\n\n2. 🛍️ **Blue Shoes**"));
        assert!(reply.contains("Price: not available"));

        let arabic = format_recommendations(&results, &Language::Arabic);
        assert!(arabic.starts_with("إليك 2 منتجات قد تعجبك:"));
    }

    #[test]
    fn empty_results_render_the_no_results_message() {
        assert_eq!(
            format_recommendations(&[], &Language::English),
            "Sorry, I couldn't find any products matching your request."
        );
        assert_eq!(
            format_recommendations(&[], &Language::Arabic),
            "عذراً، لم أجد منتجات مطابقة لطلبك."
        );
    }

    #[tokio::test]
    async fn template_greeting_is_localized() {
        let generator = TemplateReplyGenerator;
        let reply = generator
            .greeting(&GreetingContext { text: "مرحبا".to_string(), language: Language::Arabic })
            .await
            .expect("greeting");
        assert!(reply.starts_with("مرحباً!"));
    }

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn llm_recommendation_keeps_the_product_list() {
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        let generator = LlmReplyGenerator::new(Arc::new(FixedLlm("Great picks for you!")), prompts);
        let reply = generator
            .recommendation(&RecommendationContext {
                text: "show me shoes".to_string(),
                query: "shoes".to_string(),
                language: Language::English,
                results: vec![entry("Red Shoes", Some("Acme"), None)],
            })
            .await
            .expect("recommendation");
        assert!(reply.starts_with("Great picks for you!\n\nHere are 1 products"));
        assert!(reply.contains("**Red Shoes** by Acme"));
    }

    #[tokio::test]
    async fn blank_llm_greeting_is_an_error() {
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        let generator = LlmReplyGenerator::new(Arc::new(FixedLlm("  ")), prompts);
        let result = generator
            .greeting(&GreetingContext { text: "hi".to_string(), language: Language::English })
            .await;
        assert!(result.is_err());
    }
}
