//! Run configuration.
//!
//! Sources are layered: built-in defaults, then an optional JSON file, then
//! `COSTFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::InventoryFilter;
use crate::errors::{CostflowError, ValidationError};
use crate::pipeline::{CacheConfig, RetryConfig};

/// Inventory discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Scopes queried concurrently; results are merged in this order.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<InventoryFilter>,
    /// Fail Scan with a validation error when nothing is found.
    #[serde(default)]
    pub require_resources: bool,
    /// Keep at most this many resources after merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

fn default_scopes() -> Vec<InventoryFilter> {
    vec![InventoryFilter::default()]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
            require_resources: false,
            limit: None,
        }
    }
}

/// Cost attribution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Length of the trailing cost window in days.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Resource ids per cost query.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_window_days() -> u32 {
    30
}

fn default_batch_size() -> usize {
    50
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            batch_size: default_batch_size(),
        }
    }
}

/// Candidate generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeConfig {
    /// Generator calls in flight at once.
    #[serde(default = "default_generator_concurrency")]
    pub generator_concurrency: usize,
    /// Tags every resource is expected to carry.
    #[serde(default = "default_required_tags")]
    pub required_tags: Vec<String>,
}

fn default_generator_concurrency() -> usize {
    4
}

fn default_required_tags() -> Vec<String> {
    vec!["environment".to_string(), "owner".to_string(), "cost-center".to_string()]
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            generator_concurrency: default_generator_concurrency(),
            required_tags: default_required_tags(),
        }
    }
}

/// Report assembly settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Monthly cost, in minor units, at or above which a resource is "high cost".
    #[serde(default = "default_high_cost_threshold")]
    pub high_cost_threshold_minor: i64,
    /// Recommendations highlighted in summaries.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_high_cost_threshold() -> i64 {
    10_000
}

fn default_top_n() -> usize {
    5
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            high_cost_threshold_minor: default_high_cost_threshold(),
            top_n: default_top_n(),
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostflowConfig {
    /// Currency every cost entry must be denominated in.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Stage retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Result cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Scan stage.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Analyze stage.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Optimize stage.
    #[serde(default)]
    pub optimize: OptimizeConfig,
    /// Report stage.
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for CostflowConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            scan: ScanConfig::default(),
            analysis: AnalysisConfig::default(),
            optimize: OptimizeConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl CostflowConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults, then `path` if given, then the process environment,
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, CostflowError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, CostflowError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| CostflowError::Config(format!("{}: {e}", path.display())))
    }

    /// Applies `COSTFLOW_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, CostflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "COSTFLOW_MAX_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "COSTFLOW_BASE_DELAY_MS")? {
            self.retry.base_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "COSTFLOW_MAX_DELAY_MS")? {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "COSTFLOW_CACHE_TTL_SECS")? {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "COSTFLOW_RESOURCE_LIMIT")? {
            self.scan.limit = Some(v);
        }
        if let Some(subscription) = lookup("COSTFLOW_SUBSCRIPTION_ID") {
            self.scan.scopes = vec![InventoryFilter::subscription(subscription)];
        }
        if let Some(currency) = lookup("COSTFLOW_CURRENCY") {
            self.currency = currency.trim().to_ascii_uppercase();
        }
        Ok(self)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::new("must be at least 1").with_field("retry.max_attempts"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ValidationError::new("must not be below retry.base_delay_ms")
                .with_field("retry.max_delay_ms"));
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::new("must not be empty").with_field("currency"));
        }
        if self.scan.scopes.is_empty() {
            return Err(
                ValidationError::new("at least one scope is required").with_field("scan.scopes")
            );
        }
        if self.analysis.window_days == 0 {
            return Err(
                ValidationError::new("must be at least 1").with_field("analysis.window_days")
            );
        }
        if self.analysis.batch_size == 0 {
            return Err(
                ValidationError::new("must be at least 1").with_field("analysis.batch_size")
            );
        }
        if self.optimize.generator_concurrency == 0 {
            return Err(ValidationError::new("must be at least 1")
                .with_field("optimize.generator_concurrency"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, CostflowError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| CostflowError::Config(format!("{name}={raw:?}: {e}")))
        })
        .transpose()
}
