use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use souq_core::catalog::{parse_records, RawProduct};
use souq_core::config::{CatalogConfig, CatalogSourceKind};
use souq_core::{CatalogError, CatalogSource, JsonFileCatalogSource};

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Picks the configured bulk source. Nothing is read until the index is built.
pub fn build_catalog_source(
    config: &CatalogConfig,
) -> Result<Arc<dyn CatalogSource>, CatalogError> {
    match config.source {
        CatalogSourceKind::File => {
            Ok(Arc::new(JsonFileCatalogSource::new(&config.path, config.max_products)))
        }
        CatalogSourceKind::Http => {
            let url = config.url.clone().ok_or_else(|| CatalogError::Fetch {
                origin: "catalog.url".to_string(),
                message: "no URL configured".to_string(),
            })?;
            Ok(Arc::new(HttpCatalogSource::new(url, config.max_products, FETCH_TIMEOUT)?))
        }
    }
}

/// Catalog served as JSON (array or JSON lines) from an object-store URL.
#[derive(Clone, Debug)]
pub struct HttpCatalogSource {
    client: Client,
    url: String,
    max_products: Option<usize>,
}

impl HttpCatalogSource {
    pub fn new(
        url: impl Into<String>,
        max_products: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let url = url.into();
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            CatalogError::Fetch { origin: url.clone(), message: error.to_string() }
        })?;
        Ok(Self { client, url, max_products })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn load_records(&self) -> Result<Vec<RawProduct>, CatalogError> {
        let fetch_error =
            |message: String| CatalogError::Fetch { origin: self.url.clone(), message };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|error| fetch_error(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("server answered {status}")));
        }
        let body = response.text().await.map_err(|error| fetch_error(error.to_string()))?;
        parse_records(&body, &self.url, self.max_products)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use souq_core::config::{AppConfig, CatalogSourceKind};
    use souq_core::{CatalogError, CatalogSource};

    use super::{build_catalog_source, HttpCatalogSource};

    async fn spawn() -> String {
        let app = Router::new()
            .route(
                "/products.json",
                get(|| async {
                    r#"[{"id": "a", "name_en": "Red Shoes"}, {"id": "b", "name": "Blue Shoes"}, {"id": "c", "title": "Laptop"}]"#
                }),
            )
            .route(
                "/products.jsonl",
                get(|| async {
                    "{\"id\": \"a\", \"name_en\": \"Kettle\"}\n{\"id\": \"b\", \"name_ar\": \"غلاية\"}\n"
                }),
            )
            .route("/missing.json", get(|| async { StatusCode::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn fetches_json_arrays_and_honours_max_products() {
        let base = spawn().await;
        let source =
            HttpCatalogSource::new(format!("{base}/products.json"), Some(2), Duration::from_secs(5))
                .expect("source");

        let records = source.load_records().await.expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("name").and_then(|value| value.as_str()), Some("Blue Shoes"));
    }

    #[tokio::test]
    async fn fetches_json_lines() {
        let base = spawn().await;
        let url = format!("{base}/products.jsonl");
        let source = HttpCatalogSource::new(url, None, Duration::from_secs(5)).expect("source");

        assert_eq!(source.load_records().await.expect("records").len(), 2);
    }

    #[tokio::test]
    async fn http_errors_are_fetch_errors() {
        let base = spawn().await;
        let url = format!("{base}/missing.json");
        let source = HttpCatalogSource::new(url, None, Duration::from_secs(5)).expect("source");

        let error = source.load_records().await.expect_err("404");
        assert!(matches!(error, CatalogError::Fetch { .. }));
    }

    #[tokio::test]
    async fn configured_source_follows_catalog_kind() {
        let base = spawn().await;
        let mut config = AppConfig::default().catalog;
        assert_eq!(
            build_catalog_source(&config).expect("file source").describe(),
            "file:data/products.json"
        );

        config.source = CatalogSourceKind::Http;
        assert!(matches!(build_catalog_source(&config), Err(CatalogError::Fetch { .. })));

        config.url = Some(format!("{base}/products.json"));
        config.max_products = Some(1);
        let source = build_catalog_source(&config).expect("http source");
        assert_eq!(source.load_records().await.expect("records").len(), 1);
    }
}
