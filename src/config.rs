//! 配置模块：从 YAML/JSON 文件与环境变量加载全部组件配置。
//!
//! # Configuration
//!
//! [`CoreConfig`] groups the per-component configs. Every field has a
//! default, so an empty document is a valid configuration:
//!
//! ```yaml
//! cache:
//!   max_entries: 100
//!   ttl_secs: 1800
//!   enabled: true
//! history:
//!   max_entries: 50
//!   session_view_limit: 10
//!   storage_key: consultation_history
//! similarity:
//!   length_change_threshold: 0.2
//!   similarity_threshold: 0.7
//! orchestrator:
//!   record_failures: true
//! ```
//!
//! Environment overrides, applied by [`CoreConfig::apply_env_overrides`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CONSULT_CACHE_MAX_ENTRIES` | `cache.max_entries` |
//! | `CONSULT_CACHE_TTL_SECS` | `cache.ttl_secs` |
//! | `CONSULT_HISTORY_MAX_ENTRIES` | `history.max_entries` |
//! | `CONSULT_HISTORY_RETENTION_HOURS` | `history.retention_hours` |

use crate::cache::CacheConfig;
use crate::history::HistoryConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::similarity::SimilarityConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_CACHE_MAX_ENTRIES: &str = "CONSULT_CACHE_MAX_ENTRIES";
pub const ENV_CACHE_TTL_SECS: &str = "CONSULT_CACHE_TTL_SECS";
pub const ENV_HISTORY_MAX_ENTRIES: &str = "CONSULT_HISTORY_MAX_ENTRIES";
pub const ENV_HISTORY_RETENTION_HOURS: &str = "CONSULT_HISTORY_RETENTION_HOURS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub similarity: SimilarityConfig,
    pub orchestrator: OrchestratorConfig,
}

impl CoreConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.json` file as JSON and anything else as YAML.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                "failed to read config file",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(e.to_string())
                    .with_source("core_config"),
            )
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Applies `CONSULT_*` variables from the process environment.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(max) = parse_var::<usize>(&lookup, ENV_CACHE_MAX_ENTRIES)? {
            self.cache.max_entries = max;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_CACHE_TTL_SECS)? {
            self.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize>(&lookup, ENV_HISTORY_MAX_ENTRIES)? {
            self.history.max_entries = max;
        }
        if let Some(hours) = parse_var::<u64>(&lookup, ENV_HISTORY_RETENTION_HOURS)? {
            self.history.retention_hours = hours;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.history.validate()?;
        self.similarity.validate()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        Error::configuration_with_context(
            format!("{} is not a valid number", key),
            ErrorContext::new()
                .with_field_path(key)
                .with_details(raw.clone())
                .with_source("env"),
        )
    })
}
