use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::db::BalancePolicy;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Level for `sqlx::query` statement logs, independent of `log_level`
    #[serde(default = "default_sql_log_level")]
    pub sql_log_level: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Upper bound on row-lock waits inside a transaction
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

fn default_sql_log_level() -> String {
    "warn".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    #[serde(default)]
    pub balance_policy: BalancePolicy,
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply environment overrides.
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config yaml")
    }

    /// `DATABASE_URL` and `LEDGER_BALANCE_POLICY` win over the file.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => self.database.url = url,
            _ => {}
        }
        if let Ok(policy) = std::env::var("LEDGER_BALANCE_POLICY") {
            self.ledger.balance_policy = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("LEDGER_BALANCE_POLICY")?;
        }
        Ok(())
    }
}
