use crate::error::{PipelineError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CSV_URL: &str =
    "https://raw.githubusercontent.com/apache/airflow/main/docs/apache-airflow/tutorial/pipeline_example.csv";

/// One connection is pinned by the run lock, the steps need another
pub const MIN_DB_CONNECTIONS: u32 = 2;

const RAW_FILE_NAME: &str = "employees.csv";
const TRANSFORMED_FILE_NAME: &str = "transformed_employees.csv";

/// Permanent and staging table names, validated as plain SQL identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    permanent: String,
    staging: String,
}

impl TableNames {
    pub fn new(permanent: &str, staging: &str) -> Result<Self> {
        validate_identifier(permanent)?;
        validate_identifier(staging)?;
        if permanent == staging {
            return Err(PipelineError::InvalidConfig(format!(
                "permanent and staging table are both '{}'",
                permanent
            )));
        }
        Ok(Self {
            permanent: permanent.to_string(),
            staging: staging.to_string(),
        })
    }

    pub fn permanent(&self) -> &str {
        &self.permanent
    }

    pub fn staging(&self) -> &str {
        &self.staging
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            permanent: "employees".to_string(),
            staging: "employees_temp".to_string(),
        }
    }
}

/// Table names are interpolated into SQL text, so only `[A-Za-z_][A-Za-z0-9_]*`
/// up to Postgres' 63 byte limit is accepted.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                && name.len() <= 63
        }
        None => false,
    };

    if !valid {
        return Err(PipelineError::InvalidConfig(format!(
            "invalid table name '{}'",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub csv_url: String,
    pub data_dir: PathBuf,
    pub http_timeout: Duration,
    pub run_timeout: Duration,
    pub tables: TableNames,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tables = TableNames::new(
            &lookup("EMPLOYEES_TABLE").unwrap_or_else(|| "employees".to_string()),
            &lookup("EMPLOYEES_STAGING_TABLE").unwrap_or_else(|| "employees_temp".to_string()),
        )?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        if db_max_connections < MIN_DB_CONNECTIONS {
            return Err(PipelineError::InvalidConfig(format!(
                "DB_MAX_CONNECTIONS must be at least {}, got {}",
                MIN_DB_CONNECTIONS, db_max_connections
            )));
        }

        Ok(Self {
            db_url: lookup("DB_URL"),
            db_max_connections,
            csv_url: lookup("EMPLOYEES_CSV_URL").unwrap_or_else(|| DEFAULT_CSV_URL.to_string()),
            data_dir: PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string())),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 120)?),
            run_timeout: Duration::from_secs(parse_or(&lookup, "RUN_TIMEOUT_SECS", 3600)?),
            tables,
        })
    }

    pub fn raw_csv_path(&self) -> PathBuf {
        self.data_dir.join(RAW_FILE_NAME)
    }

    pub fn transformed_csv_path(&self) -> PathBuf {
        self.data_dir.join(TRANSFORMED_FILE_NAME)
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig("DB_URL env var missing".to_string()))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            PipelineError::InvalidConfig(format!("{} must be a number, got '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.db_url, None);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.csv_url, DEFAULT_CSV_URL);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.http_timeout, Duration::from_secs(120));
        assert_eq!(config.run_timeout, Duration::from_secs(3600));
        assert_eq!(config.tables, TableNames::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DB_URL", "postgres://localhost/etl"),
            ("EMPLOYEES_CSV_URL", "http://example.test/e.csv"),
            ("DATA_DIR", "/tmp/etl"),
            ("HTTP_TIMEOUT_SECS", "10"),
            ("RUN_TIMEOUT_SECS", "60"),
            ("EMPLOYEES_TABLE", "staff"),
            ("EMPLOYEES_STAGING_TABLE", "staff_temp"),
        ])
        .unwrap();

        assert_eq!(config.require_db_url().unwrap(), "postgres://localhost/etl");
        assert_eq!(config.csv_url, "http://example.test/e.csv");
        assert_eq!(config.raw_csv_path(), PathBuf::from("/tmp/etl/employees.csv"));
        assert_eq!(
            config.transformed_csv_path(),
            PathBuf::from("/tmp/etl/transformed_employees.csv")
        );
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.run_timeout, Duration::from_secs(60));
        assert_eq!(config.tables.permanent(), "staff");
        assert_eq!(config.tables.staging(), "staff_temp");
    }

    #[test]
    fn test_missing_db_url() {
        let config = config_from(&[]).unwrap();
        assert!(matches!(
            config.require_db_url(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_number() {
        let result = config_from(&[("RUN_TIMEOUT_SECS", "an hour")]);
        match result {
            Err(PipelineError::InvalidConfig(msg)) => assert!(msg.contains("RUN_TIMEOUT_SECS")),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_pool_too_small_for_run_lock() {
        for value in ["0", "1"] {
            match config_from(&[("DB_MAX_CONNECTIONS", value)]) {
                Err(PipelineError::InvalidConfig(msg)) => {
                    assert!(msg.contains("DB_MAX_CONNECTIONS"))
                }
                other => panic!("expected InvalidConfig for {}, got {:?}", value, other),
            }
        }
        let config = config_from(&[("DB_MAX_CONNECTIONS", "2")]).unwrap();
        assert_eq!(config.db_max_connections, 2);
    }

    #[test]
    fn test_table_name_validation() {
        assert!(TableNames::new("employees", "employees_temp").is_ok());
        assert!(TableNames::new("_e1", "e2").is_ok());
        assert!(TableNames::new("", "employees_temp").is_err());
        assert!(TableNames::new("1employees", "employees_temp").is_err());
        assert!(TableNames::new("employees; DROP TABLE x", "employees_temp").is_err());
        assert!(TableNames::new("employees", "\"employees_temp\"").is_err());
        assert!(TableNames::new(&"e".repeat(64), "employees_temp").is_err());
        assert!(TableNames::new("employees", "employees").is_err());
    }
}
