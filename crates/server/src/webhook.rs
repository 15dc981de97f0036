//! Messaging webhook: form-encoded inbound message in, TwiML reply out.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use souq_agent::{InboundHandler, InboundMessage};
use souq_core::{ApplicationError, InterfaceError};
use tera::{Context, Tera};
use tracing::{error, info, warn};
use uuid::Uuid;

const TEMPLATE_NAME: &str = "message.xml";
const XML_CONTENT_TYPE: &str = "application/xml";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url: Option<String>,
}

impl WebhookForm {
    fn media_count(&self) -> u32 {
        self.num_media.as_deref().and_then(|raw| raw.trim().parse().ok()).unwrap_or(0)
    }

    pub fn into_message(self) -> InboundMessage {
        let media_ref = if self.media_count() > 0 {
            self.media_url.filter(|url| !url.trim().is_empty())
        } else {
            None
        };
        InboundMessage { user_id: self.from, body: self.body, media_ref, language_hint: None }
    }
}

#[derive(Clone)]
pub struct WebhookState {
    inbound: Arc<InboundHandler>,
    templates: Arc<Tera>,
}

pub fn router(inbound: Arc<InboundHandler>) -> Result<Router, tera::Error> {
    Ok(Router::new()
        .route("/webhook", post(receive))
        .with_state(WebhookState { inbound, templates: init_templates()? }))
}

/// `.xml` templates are autoescaped, so reply text cannot break the envelope.
fn init_templates() -> Result<Arc<Tera>, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, include_str!("../../../templates/twiml/message.xml"))?;
    Ok(Arc::new(tera))
}

pub fn render_reply(templates: &Tera, message: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("message", message);
    templates.render(TEMPLATE_NAME, &context)
}

fn interface_response(error: InterfaceError) -> Response {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.user_message()).into_response()
}

pub async fn receive(State(state): State<WebhookState>, Form(form): Form<WebhookForm>) -> Response {
    if form.from.trim().is_empty() {
        let correlation_id = Uuid::new_v4().to_string();
        warn!(
            event_name = "server.webhook.rejected",
            correlation_id = %correlation_id,
            "inbound message without sender"
        );
        return interface_response(
            ApplicationError::InvalidInput("missing From field".to_string())
                .into_interface(correlation_id),
        );
    }

    let message = form.into_message();
    let has_media = message.media_ref.is_some();
    let outcome = state.inbound.handle(message).await;

    info!(
        event_name = "server.webhook.replied",
        correlation_id = %outcome.correlation_id,
        has_media,
        short_circuited = outcome.short_circuited,
    );

    match render_reply(&state.templates, &outcome.reply) {
        Ok(xml) => ([(header::CONTENT_TYPE, XML_CONTENT_TYPE)], xml).into_response(),
        Err(render_error) => {
            error!(
                event_name = "server.webhook.render_failed",
                correlation_id = %outcome.correlation_id,
                error = %render_error,
            );
            interface_response(
                ApplicationError::Integration(format!("reply rendering failed: {render_error}"))
                    .into_interface(outcome.correlation_id),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use rust_decimal::Decimal;
    use souq_agent::{AgentRuntime, AgentSettings, Collaborators, InboundHandler};
    use souq_core::transcripts::InMemoryTranscriptLog;
    use souq_core::{CatalogEntry, Language, ProductId, RetrievalError, Retriever};
    use tower::ServiceExt;

    use super::{init_templates, render_reply, router, WebhookForm};

    struct FixedRetriever;

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<CatalogEntry>, RetrievalError> {
            Ok(vec![CatalogEntry {
                product_id: ProductId("7".to_string()),
                language: Language::English,
                display_name: "Tom & Jerry <Deluxe>".to_string(),
                description: String::new(),
                price: Some(Decimal::new(4999, 2)),
                currency: "AED".to_string(),
                category: None,
                brand: None,
                media_url: None,
                product_url: None,
            }])
        }
    }

    fn handler() -> Arc<InboundHandler> {
        let runtime = AgentRuntime::new(
            Collaborators::offline(Arc::new(FixedRetriever), Language::English),
            AgentSettings::default(),
        );
        Arc::new(InboundHandler::new(
            Arc::new(runtime),
            None,
            Arc::new(InMemoryTranscriptLog::new()),
        ))
    }

    #[test]
    fn reply_text_is_xml_escaped() {
        let templates = init_templates().expect("templates");
        let xml = render_reply(&templates, "Tom & Jerry <Deluxe>").expect("render");

        assert!(xml.starts_with("<?xml"));
        assert!(
            xml.contains("<Response><Message>Tom &amp; Jerry &lt;Deluxe&gt;</Message></Response>")
        );
    }

    #[test]
    fn media_is_ignored_unless_counted() {
        let form = WebhookForm {
            from: "whatsapp:+1".to_string(),
            body: "hi".to_string(),
            num_media: Some("0".to_string()),
            media_url: Some("https://media/1".to_string()),
        };
        assert_eq!(form.into_message().media_ref, None);

        let form = WebhookForm {
            from: "whatsapp:+1".to_string(),
            body: String::new(),
            num_media: Some("1".to_string()),
            media_url: Some("https://media/1".to_string()),
        };
        assert_eq!(form.into_message().media_ref.as_deref(), Some("https://media/1"));
    }

    #[tokio::test]
    async fn form_post_returns_escaped_twiml() {
        let app = router(handler()).expect("router");
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("From=whatsapp%3A%2B1&Body=show+me+cartoons&NumMedia=0"))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()),
            Some("application/xml")
        );

        let body = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let xml = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(xml.contains("Tom &amp; Jerry &lt;Deluxe&gt;"), "xml: {xml}");
        assert!(!xml.contains("<Deluxe>"));
    }

    #[tokio::test]
    async fn form_post_without_sender_is_rejected() {
        let app = router(handler()).expect("router");
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("Body=hello"))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
