//! Configuration loading from workshop.toml and the environment.

use std::path::Path;

use serde::Deserialize;
use tools::catalog::{CatalogConfig, DEFAULT_ROW_LIMIT};

/// File read when `--config` is not given, if present.
pub const CONFIG_FILE: &str = "workshop.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gcp: GcpConfig,

    #[serde(default)]
    pub bigquery: BigQueryConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Where the TCP server listens and the caller connects.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Google Cloud project settings.
#[derive(Debug, Deserialize)]
pub struct GcpConfig {
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// OAuth bearer token for BigQuery and Vertex AI.
    pub access_token: Option<String>,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            location: default_location(),
            access_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BigQueryConfig {
    /// Fully qualified table; defaults to `{project}.mcp.hacker_news`.
    pub table_id: Option<String>,

    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            table_id: None,
            row_limit: default_row_limit(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_project() -> String {
    "bigquery-101-401711".to_string()
}

fn default_location() -> String {
    "us-west1".to_string()
}

fn default_row_limit() -> usize {
    DEFAULT_ROW_LIMIT
}

fn default_model() -> String {
    "gemini-1.5-flash-latest".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// File (explicit path, else `workshop.toml` if it exists, else
    /// defaults) with environment overrides on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `GCP_PROJECT`, `GCP_LOCATION`,
    /// `BIGQUERY_TABLE_ID`, `GEMINI_MODEL_ID` and `GOOGLE_ACCESS_TOKEN`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(project) = lookup("GCP_PROJECT") {
            self.gcp.project = project;
        }
        if let Some(location) = lookup("GCP_LOCATION") {
            self.gcp.location = location;
        }
        if let Some(table_id) = lookup("BIGQUERY_TABLE_ID") {
            self.bigquery.table_id = Some(table_id);
        }
        if let Some(model) = lookup("GEMINI_MODEL_ID") {
            self.gemini.model = model;
        }
        if let Some(token) = lookup("GOOGLE_ACCESS_TOKEN") {
            self.gcp.access_token = Some(token);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bigquery.row_limit == 0 {
            return Err(ConfigError::Invalid("bigquery.row_limit must be at least 1".into()));
        }
        if self.gcp.project.is_empty() {
            return Err(ConfigError::Invalid("gcp.project must not be empty".into()));
        }
        Ok(())
    }

    /// Settings for the catalog question-answering tool.
    pub fn catalog(&self) -> CatalogConfig {
        let project = self.gcp.project.clone();
        let table_id = self
            .bigquery
            .table_id
            .clone()
            .unwrap_or_else(|| format!("{project}.mcp.hacker_news"));

        CatalogConfig {
            project,
            location: self.gcp.location.clone(),
            table_id,
            model: self.gemini.model.clone(),
            access_token: self.gcp.access_token.clone(),
            row_limit: self.bigquery.row_limit,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
