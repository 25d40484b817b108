use crate::db::ConnectionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: ConnectionConfig,
    pub execution: ExecutionLimits,
    pub ingest: IngestLimits,
}

/// Bounds applied to every gateway execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// `MAX_RESULT_ROWS`
    pub max_result_rows: i64,
    /// `EXECUTE_TIMEOUT_MS`
    pub execute_timeout_ms: u64,
    pub read_only_transactions: bool,
    /// Audit error messages are cut to this many characters.
    pub audit_message_limit: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_result_rows: 1000,
            execute_timeout_ms: 5000,
            read_only_transactions: true,
            audit_message_limit: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestLimits {
    /// Data rows accepted per file (`CSV_MAX_ROWS`).
    pub max_rows: usize,
    /// Bind parameters per INSERT (`CSV_MAX_BATCH_PARAMS`).
    pub max_batch_params: usize,
    pub max_batch_rows: usize,
    /// Rows sampled for type inference.
    pub sample_rows: usize,
    /// Schema that receives imported tables (`CSV_SCHEMA`).
    pub schema: String,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_rows: 50_000,
            max_batch_params: 60_000,
            max_batch_rows: 500,
            sample_rows: 200,
            schema: String::from("csv_schema"),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dashsql")
            .join("config.toml")
    }

    /// Load the TOML file (explicit path, or the default location if it
    /// exists), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if self.database.password.is_empty() {
            if let Some(password) = lookup("PGPASSWORD") {
                self.database.password = password;
            }
        }
        if let Some(size) = parse_env(&lookup, "DB_POOL_SIZE")? {
            self.database.pool_size = size;
        }
        if let Some(rows) = parse_env(&lookup, "MAX_RESULT_ROWS")? {
            self.execution.max_result_rows = rows;
        }
        if let Some(ms) = parse_env(&lookup, "EXECUTE_TIMEOUT_MS")? {
            self.execution.execute_timeout_ms = ms;
        }
        if let Some(rows) = parse_env(&lookup, "CSV_MAX_ROWS")? {
            self.ingest.max_rows = rows;
        }
        if let Some(params) = parse_env(&lookup, "CSV_MAX_BATCH_PARAMS")? {
            self.ingest.max_batch_params = params;
        }
        if let Some(schema) = lookup("CSV_SCHEMA") {
            self.ingest.schema = schema;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.max_result_rows <= 0 {
            anyhow::bail!("max_result_rows must be positive");
        }
        if self.execution.execute_timeout_ms == 0 {
            anyhow::bail!("execute_timeout_ms must be positive");
        }
        if self.ingest.max_rows == 0 || self.ingest.max_batch_params == 0 {
            anyhow::bail!("CSV row and batch limits must be positive");
        }
        if self.ingest.max_batch_rows == 0 || self.ingest.sample_rows == 0 {
            anyhow::bail!("CSV batch and sample sizes must be positive");
        }
        if self.ingest.schema.trim().is_empty() {
            anyhow::bail!("CSV schema name must not be empty");
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.execution.max_result_rows, 1000);
        assert_eq!(config.execution.execute_timeout_ms, 5000);
        assert!(config.execution.read_only_transactions);
        assert_eq!(config.ingest.max_rows, 50_000);
        assert_eq!(config.ingest.max_batch_params, 60_000);
        assert_eq!(config.ingest.schema, "csv_schema");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("DATABASE_URL", "postgres://u:p@h/db"),
                ("MAX_RESULT_ROWS", "25"),
                ("EXECUTE_TIMEOUT_MS", " 750 "),
                ("CSV_MAX_ROWS", "10"),
                ("CSV_SCHEMA", "uploads"),
            ]))
            .unwrap();
        assert_eq!(config.database.url.as_deref(), Some("postgres://u:p@h/db"));
        assert_eq!(config.execution.max_result_rows, 25);
        assert_eq!(config.execution.execute_timeout_ms, 750);
        assert_eq!(config.ingest.max_rows, 10);
        assert_eq!(config.ingest.schema, "uploads");
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("MAX_RESULT_ROWS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_RESULT_ROWS"));
    }

    #[test]
    fn test_validate_rejects_non_positive_limits() {
        let mut config = Config::default();
        config.execution.max_result_rows = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.execution.execute_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [database]
            host = "db.internal"
            ssl_mode = "require"

            [execution]
            max_result_rows = 200
            "#,
        )
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.execution.max_result_rows, 200);
        assert_eq!(config.execution.execute_timeout_ms, 5000);
        assert_eq!(config.ingest.sample_rows, 200);
    }

    #[test]
    fn test_password_from_env_only_when_unset() {
        let mut config = Config::default();
        config.database.password = "from-file".into();
        config.apply_env(env(&[("PGPASSWORD", "from-env")])).unwrap();
        assert_eq!(config.database.password, "from-file");
    }
}
