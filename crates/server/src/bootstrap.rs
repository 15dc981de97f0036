use std::sync::Arc;

use souq_agent::catalog::build_catalog_source;
use souq_agent::embedding::build_embedder;
use souq_agent::transcription::build_transcriber;
use souq_agent::{AgentRuntime, AgentSettings, Collaborators, InboundHandler, Transcriber};
use souq_core::config::{AppConfig, ConfigError, TranscriptStore};
use souq_core::transcripts::JsonlTranscriptLog;
use souq_core::{CatalogError, IndexStore, RetrievalError, RetrievalService, TranscriptLog};
use souq_db::{connect_with_settings, migrations, DbPool, SqlTranscriptLog};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub retrieval: Arc<RetrievalService>,
    pub db_pool: Option<DbPool>,
    pub inbound: Arc<InboundHandler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("catalog source setup failed: {0}")]
    Catalog(#[source] CatalogError),
    #[error("retrieval warm-up failed: {0}")]
    Retrieval(#[source] RetrievalError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("agent setup failed: {0}")]
    Agent(String),
}

/// Builds every service and warms the index. Any failure here refuses startup.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        catalog_source = ?config.catalog.source,
        embedding_provider = config.embedding.provider.as_str(),
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let source = build_catalog_source(&config.catalog).map_err(BootstrapError::Catalog)?;
    let embedder = build_embedder(&config.embedding);
    let retrieval =
        Arc::new(RetrievalService::new(source, embedder, IndexStore::new(&config.index.path)));

    let snapshot = retrieval.get_index().await.map_err(BootstrapError::Retrieval)?;
    info!(
        event_name = "system.bootstrap.index_ready",
        correlation_id = "bootstrap",
        catalog_entries = snapshot.catalog().len(),
        index_vectors = snapshot.index().count(),
        "retrieval index ready"
    );

    let (transcripts, db_pool) = transcript_log(&config).await?;

    let collaborators = Collaborators::from_config(&config, retrieval.clone())
        .map_err(|error| BootstrapError::Agent(format!("{error:#}")))?;
    let runtime = Arc::new(AgentRuntime::new(collaborators, AgentSettings::from_config(&config)));
    let transcriber = build_transcriber(&config.transcription)
        .map_err(|error| BootstrapError::Agent(format!("{error:#}")))?
        .map(|transcriber| Arc::new(transcriber) as Arc<dyn Transcriber>);
    if transcriber.is_none() {
        info!(
            event_name = "system.bootstrap.transcription_disabled",
            correlation_id = "bootstrap",
            "voice notes will be answered with a resend request"
        );
    }

    let inbound = Arc::new(InboundHandler::new(runtime, transcriber, transcripts));
    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        "bootstrap complete"
    );

    Ok(Application { config, retrieval, db_pool, inbound })
}

async fn transcript_log(
    config: &AppConfig,
) -> Result<(Arc<dyn TranscriptLog>, Option<DbPool>), BootstrapError> {
    match config.storage.transcripts {
        TranscriptStore::Jsonl => {
            let log: Arc<dyn TranscriptLog> =
                Arc::new(JsonlTranscriptLog::new(&config.storage.transcript_path));
            Ok((log, None))
        }
        TranscriptStore::Sqlite => {
            let pool = connect_with_settings(
                &config.storage.database_url,
                config.storage.max_connections,
                config.storage.timeout_secs,
            )
            .await
            .map_err(BootstrapError::DatabaseConnect)?;
            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );
            let log: Arc<dyn TranscriptLog> = Arc::new(SqlTranscriptLog::new(pool.clone()));
            Ok((log, Some(pool)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use souq_agent::InboundMessage;
    use souq_core::config::{AppConfig, TranscriptStore};
    use tempfile::TempDir;

    use super::{bootstrap_with_config, BootstrapError};

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.catalog.path = dir.join("products.json");
        config.index.path = dir.join("products.index");
        config.index.top_k = 2;
        config.embedding.dimension = 128;
        config.storage.transcript_path = dir.join("transcripts.jsonl");
        config
    }

    fn write_catalog(dir: &Path) {
        std::fs::write(
            dir.join("products.json"),
            r#"[
                {"id": 1, "name_en": "Red Shoes", "name_ar": "حذاء أحمر", "price": 120},
                {"id": 2, "name_en": "Blue Shoes", "price": "95.50"},
                {"id": 3, "name_en": "Laptop", "price": 2999}
            ]"#,
        )
        .expect("write catalog");
    }

    #[tokio::test]
    async fn bootstrap_warms_the_index_and_answers_messages() {
        let dir = TempDir::new().expect("tempdir");
        write_catalog(dir.path());

        let app = bootstrap_with_config(config(dir.path())).await.expect("bootstrap");
        let snapshot = app.retrieval.get_index().await.expect("snapshot");
        assert_eq!(snapshot.catalog().len(), 4);
        assert_eq!(snapshot.index().count(), 4);
        assert!(dir.path().join("products.index").exists());
        assert!(app.db_pool.is_none());

        let outcome =
            app.inbound.handle(InboundMessage::text("whatsapp:+1", "show me shoes")).await;
        assert!(outcome.reply.contains("Shoes"), "reply: {}", outcome.reply);
    }

    #[tokio::test]
    async fn missing_catalog_refuses_startup() {
        let dir = TempDir::new().expect("tempdir");

        let result = bootstrap_with_config(config(dir.path())).await;
        assert!(matches!(result, Err(BootstrapError::Retrieval(_))));
    }

    #[tokio::test]
    async fn sqlite_transcript_store_runs_migrations() {
        let dir = TempDir::new().expect("tempdir");
        write_catalog(dir.path());
        let mut config = config(dir.path());
        config.storage.transcripts = TranscriptStore::Sqlite;
        config.storage.database_url = format!("sqlite://{}", dir.path().join("souq.db").display());

        let app = bootstrap_with_config(config).await.expect("bootstrap");
        let pool = app.db_pool.clone().expect("pool");
        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'transcript'",
        )
        .fetch_one(&pool)
        .await
        .expect("schema query");
        assert_eq!(tables, 1);
        pool.close().await;
    }
}
