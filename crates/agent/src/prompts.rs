use anyhow::{Context as _, Result};
use serde::Serialize;
use tera::{Context, Tera};

pub const INTENT_TEMPLATE: &str = "intent";
pub const EXTRACT_QUERY_TEMPLATE: &str = "extract_query";
pub const GREETING_TEMPLATE: &str = "greeting";
pub const RECOMMENDATION_TEMPLATE: &str = "recommendation";

const INTENT: &str = "Classify the intent of this WhatsApp message written in {{ language }}:\n\
{{ text }}\n\
Possible intents: 'greet', 'product_recommend', 'smalltalk'.\n\
Only reply with the intent keyword.";

const EXTRACT_QUERY: &str = "Extract a short product search phrase from this shopping message \
written in {{ language }}. Keep product type, colour, brand and size words. Reply with the \
phrase only, in the message's language.\n\
Message: {{ text }}";

const GREETING: &str = "{% if language == \"ar\" %}أنت مساعد تسوق ذكي. رد على الرسالة التالية \
بطريقة ودودة ومفيدة: {{ text }}{% else %}You are a smart shopping assistant. Respond to the \
following message in a friendly and helpful way: {{ text }}{% endif %}";

const RECOMMENDATION: &str = "You are a smart shopping assistant replying in {{ language }}. \
The customer asked: {{ text }}\n\
These products matched the search \"{{ query }}\":\n\
{% for product in products %}- {{ product.name }}{% if product.brand %} by {{ product.brand }}{% endif %}\n\
{% endfor %}\
Write one short friendly sentence introducing these products. Do not list them, do not \
invent prices.";

/// Prompt templates, parsed once.
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (INTENT_TEMPLATE, INTENT),
            (EXTRACT_QUERY_TEMPLATE, EXTRACT_QUERY),
            (GREETING_TEMPLATE, GREETING),
            (RECOMMENDATION_TEMPLATE, RECOMMENDATION),
        ])
        .context("failed to parse prompt templates")?;
        tera.autoescape_on(vec![]);
        Ok(Self { tera })
    }

    pub fn render<T: Serialize>(&self, template: &str, values: &T) -> Result<String> {
        let context = Context::from_serialize(values)
            .with_context(|| format!("invalid context for prompt `{template}`"))?;
        self.tera
            .render(template, &context)
            .with_context(|| format!("failed to render prompt `{template}`"))
    }
}

#[derive(Serialize)]
pub struct TextPrompt<'a> {
    pub text: &'a str,
    pub language: &'a str,
}

#[derive(Serialize)]
pub struct ProductLine<'a> {
    pub name: &'a str,
    pub brand: Option<&'a str>,
}

#[derive(Serialize)]
pub struct RecommendationPrompt<'a> {
    pub text: &'a str,
    pub query: &'a str,
    pub language: &'a str,
    pub products: Vec<ProductLine<'a>>,
}
