use anyhow::{anyhow, Result};
use std::env;

/// Runtime configuration resolved once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub data_dir: String,
    pub reference_api_url: String,
    pub api_key: String,
    pub reference_code: String,
    pub evaluator: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: optional_env("DATABASE_URL"),
            data_dir: optional_env("DATA_DIR").unwrap_or_else(|| "data".to_string()),
            reference_api_url: optional_env("REFERENCE_API_URL")
                .unwrap_or_else(|| "http://ete.stockfisher.com.hk".to_string()),
            api_key: optional_env("API_KEY").unwrap_or_default(),
            reference_code: optional_env("REFERENCE_CODE").unwrap_or_else(|| "2800".to_string()),
            evaluator: optional_env("EVALUATOR").unwrap_or_else(|| "momentum".to_string()),
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow!("DATABASE_URL must be set to run database-backed commands."))
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
