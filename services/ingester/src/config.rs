//! Ingester configuration.
//!
//! Loaded from a YAML file (with `${VAR}` / `${VAR:-default}` substitution)
//! or, when no file is given, from environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use storage::StoreConfig;

/// Top-level ingester configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngesterConfig {
    /// Station store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Upstream observation API
    #[serde(default)]
    pub api: ApiConfig,
}

/// Upstream observation API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Versioned API root, e.g. `https://opendata-download-metobs.smhi.se/api/version/latest`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Station keys to fetch
    #[serde(default)]
    pub stations: Vec<String>,

    /// Parameter codes to fetch for every station
    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,

    /// Period name, e.g. `latest-hour` or `latest-day`
    #[serde(default = "default_period")]
    pub period: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://opendata-download-metobs.smhi.se/api/version/latest".to_string()
}

/// The provider publishes parameters 1 through 40.
fn default_parameters() -> Vec<String> {
    (1..=40).map(|p| p.to_string()).collect()
}

fn default_period() -> String {
    "latest-hour".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("station-ingester/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stations: Vec::new(),
            parameters: default_parameters(),
            period: default_period(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl IngesterConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config from {:?}", path.as_ref()))?;

        let expanded = expand_env_vars(&content)?;

        let config: IngesterConfig = serde_yaml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config from {:?}", path.as_ref()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = IngesterConfig::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.store.database_url = url;
        }
        if let Some(url) = lookup("SMHI_API_URL") {
            config.api.base_url = url;
        }
        if let Some(stations) = lookup("SMHI_STATION") {
            config.api.stations = split_list(&stations);
        }
        if let Some(parameters) = lookup("SMHI_PARAMETER") {
            config.api.parameters = split_list(&parameters);
        }
        if let Some(period) = lookup("SMHI_PERIOD") {
            config.api.period = period;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.store.database_url.is_empty(),
            "Database URL cannot be empty"
        );
        anyhow::ensure!(
            self.store.max_connections > 0,
            "max_connections must be greater than 0"
        );
        anyhow::ensure!(!self.api.base_url.is_empty(), "API base URL cannot be empty");
        anyhow::ensure!(!self.api.period.is_empty(), "API period cannot be empty");
        anyhow::ensure!(
            !self.api.parameters.is_empty(),
            "At least one parameter must be configured"
        );
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Expand `${VAR}` and `${VAR:-default}` in file content.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("Unclosed variable substitution: ${{{}", after))?;
        result.push_str(&resolve_var_expr(&after[..end])?);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}
