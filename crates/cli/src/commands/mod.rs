pub mod chat;
pub mod config;
pub mod doctor;
pub mod index;
pub mod migrate;
pub mod search;
pub mod transcripts;

use serde::Serialize;
use souq_agent::catalog::build_catalog_source;
use souq_agent::embedding::build_embedder;
use souq_core::config::{AppConfig, LoadOptions};
use souq_core::{ApplicationError, IndexStore, RetrievalService};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECT: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_RETRIEVAL: u8 = 6;
pub const EXIT_TRANSCRIPTS: u8 = 7;
pub const EXIT_INVALID_INPUT: u8 = 8;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Classifies through [`ApplicationError::error_class`] so CLI and logs agree.
    pub fn from_application_error(command: &str, error: ApplicationError, exit_code: u8) -> Self {
        Self::failure(command, error.error_class(), error.to_string(), exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Logs go to stderr so stdout stays a single JSON payload.
pub fn init_logging() {
    let level = std::env::var("SOUQ_LOGGING_LEVEL")
        .or_else(|_| std::env::var("SOUQ_LOG_LEVEL"))
        .unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub(crate) fn retrieval_service(
    command: &str,
    config: &AppConfig,
) -> Result<RetrievalService, CommandResult> {
    let source = build_catalog_source(&config.catalog).map_err(|error| {
        CommandResult::from_application_error(command, error.into(), EXIT_RETRIEVAL)
    })?;
    Ok(RetrievalService::new(
        source,
        build_embedder(&config.embedding),
        IndexStore::new(&config.index.path),
    ))
}
