use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub transcription: TranscriptionConfig,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub source: CatalogSourceKind,
    pub path: PathBuf,
    pub url: Option<String>,
    pub max_products: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub top_k: usize,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct TranscriptionConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub media_username: Option<String>,
    pub media_password: Option<SecretString>,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub transcripts: TranscriptStore,
    pub transcript_path: PathBuf,
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub stage_timeout_secs: u64,
    pub default_language: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSourceKind {
    File,
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hashing,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStore {
    Jsonl,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub catalog_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub top_k: Option<usize>,
    pub embedding_provider: Option<EmbeddingProvider>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig {
                source: CatalogSourceKind::File,
                path: PathBuf::from("data/products.json"),
                url: None,
                max_products: None,
            },
            index: IndexConfig { path: PathBuf::from("data/products.index"), top_k: 5 },
            embedding: EmbeddingConfig {
                provider: EmbeddingProvider::Hashing,
                model: "paraphrase-multilingual-MiniLM-L12-v2".to_string(),
                dimension: 384,
                base_url: None,
                api_key: None,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            transcription: TranscriptionConfig {
                enabled: false,
                base_url: "https://api.assemblyai.com".to_string(),
                api_key: None,
                media_username: None,
                media_password: None,
                poll_interval_ms: 1_500,
                max_polls: 60,
            },
            storage: StorageConfig {
                transcripts: TranscriptStore::Jsonl,
                transcript_path: PathBuf::from("data/transcripts.jsonl"),
                database_url: "sqlite://souq.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            agent: AgentConfig { stage_timeout_secs: 20, default_language: "en".to_string() },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for CatalogSourceKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported catalog source `{other}` (expected file|http)"
            ))),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported embedding provider `{other}` (expected hashing|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama|disabled)"
            ))),
        }
    }
}

impl std::str::FromStr for TranscriptStore {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported transcript store `{other}` (expected jsonl|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }
}

impl EmbeddingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hashing => "hashing",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("souq.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(catalog) = patch.catalog {
            if let Some(source) = catalog.source {
                self.catalog.source = source;
            }
            if let Some(path) = catalog.path {
                self.catalog.path = path;
            }
            if let Some(url) = catalog.url {
                self.catalog.url = Some(url);
            }
            if let Some(max_products) = catalog.max_products {
                self.catalog.max_products = Some(max_products);
            }
        }

        if let Some(index) = patch.index {
            if let Some(path) = index.path {
                self.index.path = path;
            }
            if let Some(top_k) = index.top_k {
                self.index.top_k = top_k;
            }
        }

        if let Some(embedding) = patch.embedding {
            if let Some(provider) = embedding.provider {
                self.embedding.provider = provider;
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(dimension) = embedding.dimension {
                self.embedding.dimension = dimension;
            }
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = Some(base_url);
            }
            if let Some(embedding_api_key_value) = embedding.api_key {
                self.embedding.api_key = Some(secret_value(embedding_api_key_value));
            }
            if let Some(timeout_secs) = embedding.timeout_secs {
                self.embedding.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(transcription) = patch.transcription {
            if let Some(enabled) = transcription.enabled {
                self.transcription.enabled = enabled;
            }
            if let Some(base_url) = transcription.base_url {
                self.transcription.base_url = base_url;
            }
            if let Some(transcription_api_key_value) = transcription.api_key {
                self.transcription.api_key = Some(secret_value(transcription_api_key_value));
            }
            if let Some(media_username) = transcription.media_username {
                self.transcription.media_username = Some(media_username);
            }
            if let Some(media_password_value) = transcription.media_password {
                self.transcription.media_password = Some(secret_value(media_password_value));
            }
            if let Some(poll_interval_ms) = transcription.poll_interval_ms {
                self.transcription.poll_interval_ms = poll_interval_ms;
            }
            if let Some(max_polls) = transcription.max_polls {
                self.transcription.max_polls = max_polls;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(transcripts) = storage.transcripts {
                self.storage.transcripts = transcripts;
            }
            if let Some(transcript_path) = storage.transcript_path {
                self.storage.transcript_path = transcript_path;
            }
            if let Some(database_url) = storage.database_url {
                self.storage.database_url = database_url;
            }
            if let Some(max_connections) = storage.max_connections {
                self.storage.max_connections = max_connections;
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(stage_timeout_secs) = agent.stage_timeout_secs {
                self.agent.stage_timeout_secs = stage_timeout_secs;
            }
            if let Some(default_language) = agent.default_language {
                self.agent.default_language = default_language;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SOUQ_CATALOG_SOURCE") {
            self.catalog.source = value.parse()?;
        }
        if let Some(value) = read_env("SOUQ_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SOUQ_CATALOG_URL") {
            self.catalog.url = Some(value);
        }
        if let Some(value) = read_env("SOUQ_CATALOG_MAX_PRODUCTS") {
            self.catalog.max_products = Some(parse_usize("SOUQ_CATALOG_MAX_PRODUCTS", &value)?);
        }

        if let Some(value) = read_env("SOUQ_INDEX_PATH") {
            self.index.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SOUQ_INDEX_TOP_K") {
            self.index.top_k = parse_usize("SOUQ_INDEX_TOP_K", &value)?;
        }

        if let Some(value) = read_env("SOUQ_EMBEDDING_PROVIDER") {
            self.embedding.provider = value.parse()?;
        }
        if let Some(value) = read_env("SOUQ_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = read_env("SOUQ_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_usize("SOUQ_EMBEDDING_DIMENSION", &value)?;
        }
        if let Some(value) = read_env("SOUQ_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(value);
        }
        if let Some(value) = read_env("SOUQ_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOUQ_EMBEDDING_TIMEOUT_SECS") {
            self.embedding.timeout_secs = parse_u64("SOUQ_EMBEDDING_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUQ_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SOUQ_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOUQ_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SOUQ_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SOUQ_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SOUQ_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SOUQ_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("SOUQ_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_ENABLED") {
            self.transcription.enabled = parse_bool("SOUQ_TRANSCRIPTION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_BASE_URL") {
            self.transcription.base_url = value;
        }
        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_API_KEY") {
            self.transcription.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_MEDIA_USERNAME") {
            self.transcription.media_username = Some(value);
        }
        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_MEDIA_PASSWORD") {
            self.transcription.media_password = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_POLL_INTERVAL_MS") {
            self.transcription.poll_interval_ms =
                parse_u64("SOUQ_TRANSCRIPTION_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("SOUQ_TRANSCRIPTION_MAX_POLLS") {
            self.transcription.max_polls = parse_u32("SOUQ_TRANSCRIPTION_MAX_POLLS", &value)?;
        }

        if let Some(value) = read_env("SOUQ_STORAGE_TRANSCRIPTS") {
            self.storage.transcripts = value.parse()?;
        }
        if let Some(value) = read_env("SOUQ_STORAGE_TRANSCRIPT_PATH") {
            self.storage.transcript_path = PathBuf::from(value);
        }
        let database_url =
            read_env("SOUQ_STORAGE_DATABASE_URL").or_else(|| read_env("SOUQ_DATABASE_URL"));
        if let Some(value) = database_url {
            self.storage.database_url = value;
        }
        if let Some(value) = read_env("SOUQ_STORAGE_MAX_CONNECTIONS") {
            self.storage.max_connections = parse_u32("SOUQ_STORAGE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SOUQ_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("SOUQ_STORAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOUQ_AGENT_STAGE_TIMEOUT_SECS") {
            self.agent.stage_timeout_secs = parse_u64("SOUQ_AGENT_STAGE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SOUQ_AGENT_DEFAULT_LANGUAGE") {
            self.agent.default_language = value;
        }

        if let Some(value) = read_env("SOUQ_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SOUQ_SERVER_PORT") {
            self.server.port = parse_u16("SOUQ_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SOUQ_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SOUQ_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("SOUQ_LOGGING_LEVEL").or_else(|| read_env("SOUQ_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SOUQ_LOGGING_FORMAT").or_else(|| read_env("SOUQ_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = catalog_path;
        }
        if let Some(index_path) = overrides.index_path {
            self.index.path = index_path;
        }
        if let Some(top_k) = overrides.top_k {
            self.index.top_k = top_k;
        }
        if let Some(embedding_provider) = overrides.embedding_provider {
            self.embedding.provider = embedding_provider;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(database_url) = overrides.database_url {
            self.storage.database_url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_catalog(&self.catalog)?;
        validate_index(&self.index)?;
        validate_embedding(&self.embedding)?;
        validate_llm(&self.llm)?;
        validate_transcription(&self.transcription)?;
        validate_storage(&self.storage)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("souq.toml"), PathBuf::from("config/souq.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn secret_missing(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    match catalog.source {
        CatalogSourceKind::File => {
            if catalog.path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "catalog.path is required when catalog.source is `file`".to_string(),
                ));
            }
        }
        CatalogSourceKind::Http => {
            let valid = catalog.url.as_deref().map(is_http_url).unwrap_or(false);
            if !valid {
                return Err(ConfigError::Validation(
                    "catalog.url must be an http:// or https:// URL when catalog.source is `http`"
                        .to_string(),
                ));
            }
        }
    }

    if catalog.max_products == Some(0) {
        return Err(ConfigError::Validation(
            "catalog.max_products must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_index(index: &IndexConfig) -> Result<(), ConfigError> {
    if index.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("index.path is required".to_string()));
    }

    if index.top_k == 0 || index.top_k > 50 {
        return Err(ConfigError::Validation("index.top_k must be in range 1..=50".to_string()));
    }

    Ok(())
}

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if embedding.dimension == 0 {
        return Err(ConfigError::Validation(
            "embedding.dimension must be greater than zero".to_string(),
        ));
    }
    if embedding.dimension > 8192 {
        return Err(ConfigError::Validation("embedding.dimension must not exceed 8192".to_string()));
    }

    if embedding.timeout_secs == 0 || embedding.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "embedding.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match embedding.provider {
        EmbeddingProvider::Hashing => {}
        EmbeddingProvider::OpenAi => {
            if secret_missing(embedding.api_key.as_ref()) {
                return Err(ConfigError::Validation(
                    "embedding.api_key is required for the openai embedding provider".to_string(),
                ));
            }
        }
        EmbeddingProvider::Ollama => {
            let missing = embedding.base_url.as_ref().map(|value| value.trim().is_empty());
            if missing.unwrap_or(true) {
                return Err(ConfigError::Validation(
                    "embedding.base_url is required for the ollama embedding provider (e.g. http://localhost:11434/v1)"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &embedding.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "embedding.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            if secret_missing(llm.api_key.as_ref()) {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
    }

    Ok(())
}

fn validate_transcription(transcription: &TranscriptionConfig) -> Result<(), ConfigError> {
    if !transcription.enabled {
        return Ok(());
    }

    if !is_http_url(&transcription.base_url) {
        return Err(ConfigError::Validation(
            "transcription.base_url must start with http:// or https://".to_string(),
        ));
    }

    if secret_missing(transcription.api_key.as_ref()) {
        return Err(ConfigError::Validation(
            "transcription.api_key is required when transcription.enabled is true".to_string(),
        ));
    }

    if transcription.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "transcription.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if transcription.max_polls == 0 {
        return Err(ConfigError::Validation(
            "transcription.max_polls must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    match storage.transcripts {
        TranscriptStore::Jsonl => {
            if storage.transcript_path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.transcript_path is required when storage.transcripts is `jsonl`"
                        .to_string(),
                ));
            }
        }
        TranscriptStore::Sqlite => {
            let url = storage.database_url.trim();
            let sqlite_url =
                url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
            if !sqlite_url {
                return Err(ConfigError::Validation(
                    "storage.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                        .to_string(),
                ));
            }
        }
    }

    if storage.max_connections == 0 {
        return Err(ConfigError::Validation(
            "storage.max_connections must be greater than zero".to_string(),
        ));
    }

    if storage.timeout_secs == 0 || storage.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "storage.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.stage_timeout_secs == 0 || agent.stage_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.stage_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if agent.default_language.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.default_language must be a language code such as `en` or `ar`".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    catalog: Option<CatalogPatch>,
    index: Option<IndexPatch>,
    embedding: Option<EmbeddingPatch>,
    llm: Option<LlmPatch>,
    transcription: Option<TranscriptionPatch>,
    storage: Option<StoragePatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    source: Option<CatalogSourceKind>,
    path: Option<PathBuf>,
    url: Option<String>,
    max_products: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexPatch {
    path: Option<PathBuf>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    provider: Option<EmbeddingProvider>,
    model: Option<String>,
    dimension: Option<usize>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TranscriptionPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    media_username: Option<String>,
    media_password: Option<String>,
    poll_interval_ms: Option<u64>,
    max_polls: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    transcripts: Option<TranscriptStore>,
    transcript_path: Option<PathBuf>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    stage_timeout_secs: Option<u64>,
    default_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
