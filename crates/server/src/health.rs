use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use souq_core::retrieval::IndexLoad;
use souq_core::RetrievalService;

#[derive(Clone)]
pub struct HealthState {
    retrieval: Arc<RetrievalService>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexCheck {
    pub status: &'static str,
    pub catalog_entries: usize,
    pub index_vectors: usize,
    pub model: String,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub index: IndexCheck,
    pub checked_at: String,
}

pub fn router(retrieval: Arc<RetrievalService>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { retrieval })
}

/// Reports the serving snapshot. Never triggers an index build.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let index = index_check(&state.retrieval).await;
    let ready = index.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        index,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn index_check(retrieval: &RetrievalService) -> IndexCheck {
    let model = retrieval.embedder().model_id().to_string();
    if !retrieval.is_initialized().await {
        return IndexCheck {
            status: "degraded",
            catalog_entries: 0,
            index_vectors: 0,
            model,
            detail: "index not initialized".to_string(),
        };
    }

    match retrieval.get_index().await {
        Ok(snapshot) => {
            let catalog_entries = snapshot.catalog().len();
            let index_vectors = snapshot.index().count();
            let consistent = catalog_entries == index_vectors;
            let detail = match snapshot.load() {
                IndexLoad::Loaded => "index loaded from disk".to_string(),
                IndexLoad::Rebuilt(reason) => format!("index rebuilt ({})", reason.code()),
            };
            IndexCheck {
                status: if consistent { "ready" } else { "degraded" },
                catalog_entries,
                index_vectors,
                model,
                detail,
            }
        }
        Err(error) => IndexCheck {
            status: "degraded",
            catalog_entries: 0,
            index_vectors: 0,
            model,
            detail: format!("index unavailable: {error}"),
        },
    }
}
