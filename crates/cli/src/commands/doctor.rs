use serde::Serialize;
use souq_agent::embedding::build_embedder;
use souq_core::config::{AppConfig, CatalogSourceKind, LlmProvider, LoadOptions, TranscriptStore};
use souq_core::retrieval::{Embedder, StaleReason};
use souq_core::IndexStore;
use souq_db::connect_with_settings;
use tokio::runtime::Runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["catalog_source", "index_store", "transcript_store", "llm_provider"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_catalog_source(&config));
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => {
                    checks.push(check_index_store(&runtime, &config));
                    checks.push(check_transcript_store(&runtime, &config));
                }
                Err(error) => {
                    let details = format!("failed to initialize async runtime: {error}");
                    checks.push(DoctorCheck::fail("index_store", details.clone()));
                    checks.push(DoctorCheck::fail("transcript_store", details));
                }
            }
            checks.push(check_llm_provider(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck::skipped(
                    name,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    // Skipped checks are informational and do not fail the report.
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog_source(config: &AppConfig) -> DoctorCheck {
    match config.catalog.source {
        CatalogSourceKind::File if config.catalog.path.is_file() => DoctorCheck::pass(
            "catalog_source",
            format!("catalog file `{}` is present", config.catalog.path.display()),
        ),
        CatalogSourceKind::File => DoctorCheck::fail(
            "catalog_source",
            format!("catalog file `{}` does not exist", config.catalog.path.display()),
        ),
        CatalogSourceKind::Http => DoctorCheck::pass(
            "catalog_source",
            format!(
                "remote catalog `{}` is fetched at index build time",
                config.catalog.url.as_deref().unwrap_or("<unset>")
            ),
        ),
    }
}

fn check_index_store(runtime: &Runtime, config: &AppConfig) -> DoctorCheck {
    let store = IndexStore::new(&config.index.path);
    let model_id = build_embedder(&config.embedding).model_id().to_string();
    match runtime.block_on(store.read()) {
        Ok(index) if index.dimension() != config.embedding.dimension => DoctorCheck::pass(
            "index_store",
            format!(
                "index dimension {} differs from embedding.dimension {}; it will be rebuilt on startup",
                index.dimension(),
                config.embedding.dimension
            ),
        ),
        Ok(index) if index.model_id() != model_id => DoctorCheck::pass(
            "index_store",
            format!(
                "index model `{}` differs from configured `{model_id}`; rebuilt on next startup",
                index.model_id()
            ),
        ),
        Ok(index) => DoctorCheck::pass(
            "index_store",
            format!(
                "{} vectors of dimension {} from `{model_id}` at `{}`",
                index.count(),
                index.dimension(),
                store.path().display()
            ),
        ),
        Err(StaleReason::Missing) => DoctorCheck::skipped(
            "index_store",
            format!("no index at `{}` yet; it will be built on startup", store.path().display()),
        ),
        Err(reason) => DoctorCheck::fail(
            "index_store",
            format!("persisted index is unusable ({}); run `souq index --rebuild`", reason.code()),
        ),
    }
}

fn check_transcript_store(runtime: &Runtime, config: &AppConfig) -> DoctorCheck {
    match config.storage.transcripts {
        TranscriptStore::Jsonl => DoctorCheck::pass(
            "transcript_store",
            format!("appending JSON lines to `{}`", config.storage.transcript_path.display()),
        ),
        TranscriptStore::Sqlite => {
            let result = runtime.block_on(async {
                let pool = connect_with_settings(
                    &config.storage.database_url,
                    config.storage.max_connections,
                    config.storage.timeout_secs,
                )
                .await
                .map_err(|error| format!("failed to connect to database: {error}"))?;
                pool.close().await;
                Ok::<(), String>(())
            });
            match result {
                Ok(()) => DoctorCheck::pass(
                    "transcript_store",
                    format!("connected using `{}`", config.storage.database_url),
                ),
                Err(error) => DoctorCheck::fail("transcript_store", error),
            }
        }
    }
}

fn check_llm_provider(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider {
        LlmProvider::Disabled => DoctorCheck::pass(
            "llm_provider",
            "disabled; keyword classification and template replies are used",
        ),
        provider => DoctorCheck::pass(
            "llm_provider",
            format!("{} with model `{}`", provider.as_str(), config.llm.model),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
