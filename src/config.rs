use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub affinity: AffinityConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Per-account overrides, keyed by account id
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct AffinityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

/// Storage backend behind the contact graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

/// How account graphs are partitioned inside the indexed backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// One database file per account
    Account,
    /// One shared database, filtered by account id
    Combined,
}

/// Backend selection and tuning
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default = "default_index_type")]
    pub index_type: IndexType,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            index_type: default_index_type(),
            data_dir: default_data_dir(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl BackendConfig {
    /// In-memory backend, used by tests and small deployments.
    pub fn memory() -> Self {
        Self { kind: BackendKind::Memory, ..Self::default() }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Update engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_max_clique_size")]
    pub max_clique_size: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { max_clique_size: default_max_clique_size() }
    }
}

/// Per-tenant tunables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfig {
    pub max_clique_size: Option<usize>,
}

/// Related-contacts request limits
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl QueryConfig {
    /// Missing or zero limits fall back to the default; larger ones are clamped.
    pub fn limit_for(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.default_limit,
            Some(n) => n.min(self.max_limit),
        }
    }
}

/// Scheduled pruning
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_max_edge_age_days")]
    pub max_edge_age_days: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            max_edge_age_days: default_max_edge_age_days(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

impl MaintenanceConfig {
    pub fn max_edge_age(&self) -> Duration {
        Duration::from_secs(self.max_edge_age_days.saturating_mul(24 * 60 * 60))
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Sqlite
}

fn default_index_type() -> IndexType {
    IndexType::Account
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_max_clique_size() -> usize {
    10
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

fn default_max_edge_age_days() -> u64 {
    365
}

fn default_prune_interval_secs() -> u64 {
    24 * 60 * 60
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in AFFINITY_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("AFFINITY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tracking.max_clique_size < 2 {
            anyhow::bail!("tracking.max_clique_size must be at least 2");
        }

        for (account, tenant) in &self.tenants {
            if matches!(tenant.max_clique_size, Some(n) if n < 2) {
                anyhow::bail!("tenants.{}.max_clique_size must be at least 2", account);
            }
        }

        if self.query.default_limit == 0 {
            anyhow::bail!("query.default_limit must be greater than 0");
        }

        if self.query.default_limit > self.query.max_limit {
            anyhow::bail!("query.default_limit must not exceed query.max_limit");
        }

        if self.backend.query_timeout_ms == 0 {
            anyhow::bail!("backend.query_timeout_ms must be greater than 0");
        }

        if self.maintenance.prune_interval_secs == 0 {
            anyhow::bail!("maintenance.prune_interval_secs must be greater than 0");
        }

        Ok(())
    }

    /// Maximum clique size for an account, honouring tenant overrides
    pub fn max_clique_size_for(&self, account_id: &str) -> usize {
        self.tenants
            .get(account_id)
            .and_then(|t| t.max_clique_size)
            .unwrap_or(self.tracking.max_clique_size)
    }
}
