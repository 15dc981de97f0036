use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use souq_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// One inspected setting: dotted key, printable value, and the env var that overrides it.
struct Field {
    key: &'static str,
    value: String,
    env_key: String,
}

impl Field {
    /// `catalog.max_products` is overridden by `SOUQ_CATALOG_MAX_PRODUCTS`.
    fn new(key: &'static str, value: impl ToString) -> Self {
        let env_key = format!("SOUQ_{}", key.replace('.', "_").to_uppercase());
        Self { key, value: value.to_string(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            &field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("catalog.source", format!("{:?}", config.catalog.source).to_lowercase()),
        Field::new("catalog.path", config.catalog.path.display()),
        Field::new("catalog.url", or_unset(config.catalog.url.as_deref())),
        Field::new("catalog.max_products", or_unset(config.catalog.max_products)),
        Field::new("index.path", config.index.path.display()),
        Field::new("index.top_k", config.index.top_k),
        Field::new("embedding.provider", config.embedding.provider.as_str()),
        Field::new("embedding.model", &config.embedding.model),
        Field::new("embedding.dimension", config.embedding.dimension),
        Field::new("embedding.base_url", or_unset(config.embedding.base_url.as_deref())),
        Field::new("embedding.api_key", redact(config.embedding.api_key.as_ref())),
        Field::new("llm.provider", config.llm.provider.as_str()),
        Field::new("llm.model", &config.llm.model),
        Field::new("llm.base_url", or_unset(config.llm.base_url.as_deref())),
        Field::new("llm.api_key", redact(config.llm.api_key.as_ref())),
        Field::new("transcription.enabled", config.transcription.enabled),
        Field::new("transcription.base_url", &config.transcription.base_url),
        Field::new("transcription.api_key", redact(config.transcription.api_key.as_ref())),
        Field::new(
            "transcription.media_password",
            redact(config.transcription.media_password.as_ref()),
        ),
        Field::new(
            "storage.transcripts",
            format!("{:?}", config.storage.transcripts).to_lowercase(),
        ),
        Field::new("storage.transcript_path", config.storage.transcript_path.display()),
        Field::new("storage.database_url", &config.storage.database_url),
        Field::new("agent.stage_timeout_secs", config.agent.stage_timeout_secs),
        Field::new("agent.default_language", &config.agent.default_language),
        Field::new("server.bind_address", &config.server.bind_address),
        Field::new("server.port", config.server.port),
        Field::new("logging.level", &config.logging.level),
        Field::new("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ]
}

fn or_unset(value: Option<impl ToString>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "<unset>".to_string())
}

fn redact(secret: Option<&SecretString>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("souq.toml"), PathBuf::from("config/souq.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
