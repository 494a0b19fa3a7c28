use crate::error::{AskDbError, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "host=localhost port=5432 user=postgres dbname=postgres";
const DEFAULT_MODEL_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "mistral";
const DEFAULT_ROW_LIMIT: u32 = 100;
const DEFAULT_MAX_TABLES: usize = 200;
const DEFAULT_MAX_COLUMNS: usize = 60;
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_METRICS_FILE: &str = "ai_sql_metrics.csv";

/// everything a session needs to know about its surroundings
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub model_endpoint: String,
    pub model: String,
    pub row_limit: u32,
    pub max_tables: usize,
    pub max_columns: usize,
    pub statement_timeout: Duration,
    pub model_timeout: Duration,
    pub metrics_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            model_endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
            max_tables: DEFAULT_MAX_TABLES,
            max_columns: DEFAULT_MAX_COLUMNS,
            statement_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            metrics_path: PathBuf::from(DEFAULT_METRICS_FILE),
        }
    }
}

impl AppConfig {
    /// defaults overlaid with any non-empty `ASKDB_*` environment values
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = env_value("ASKDB_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(endpoint) = env_value("ASKDB_MODEL_ENDPOINT").or_else(|| env_value("OLLAMA_HOST")) {
            config.model_endpoint = endpoint;
        }
        if let Some(model) = env_value("ASKDB_MODEL") {
            config.model = model;
        }
        if let Some(limit) = parse_env("ASKDB_ROW_LIMIT")? {
            config.row_limit = limit;
        }
        if let Some(max_tables) = parse_env("ASKDB_MAX_TABLES")? {
            config.max_tables = max_tables;
        }
        if let Some(max_columns) = parse_env("ASKDB_MAX_COLUMNS")? {
            config.max_columns = max_columns;
        }
        if let Some(secs) = parse_env::<u64>("ASKDB_STATEMENT_TIMEOUT_SECS")? {
            config.statement_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("ASKDB_MODEL_TIMEOUT_SECS")? {
            config.model_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = env_value("AI_SQL_CSV_PATH") {
            config.metrics_path = PathBuf::from(path);
        }

        config.model_endpoint = normalize_endpoint(&config.model_endpoint);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.row_limit == 0 {
            return Err(AskDbError::Config("row limit must be greater than zero".to_string()));
        }
        if self.max_tables == 0 || self.max_columns == 0 {
            return Err(AskDbError::Config(
                "catalog caps (max tables, max columns) must be greater than zero".to_string(),
            ));
        }
        if self.statement_timeout.is_zero() || self.model_timeout.is_zero() {
            return Err(AskDbError::Config(
                "statement and model timeouts must be greater than zero".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(AskDbError::Config("model identifier must not be empty".to_string()));
        }
        if self.model_endpoint.trim().is_empty() {
            return Err(AskDbError::Config("model endpoint must not be empty".to_string()));
        }
        Ok(())
    }
}

/// adds a scheme when missing and drops trailing slashes
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    endpoint.trim_end_matches('/').to_string()
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_value(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AskDbError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(None),
    }
}
