//! Scheduler configuration with TOML file support.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use keel_types::Address;
use keel_utils::LogFormat;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::rules::{RuleOverride, RuleSet};

/// Configuration for the operation scheduler.
///
/// Loaded from a TOML file via [`SchedulerConfig::from_toml_file`], then
/// overridden from CLI/env by the daemon. Checked by
/// [`SchedulerConfig::validate`] when the scheduler starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// The multisig proposals are made under (`SAFE_ADDRESS`). Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_address: Option<Address>,

    /// The operation registry (`SAFE_MANAGER_ADDRESS`). Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_manager_address: Option<Address>,

    /// Execution loop period in milliseconds (`EXECUTION_INTERVAL`).
    #[serde(default = "default_execution_interval_ms")]
    pub execution_interval_ms: u64,

    /// Items taken per execution tick (`MAX_BATCH_SIZE`).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Monitoring loop period in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Status log period in milliseconds.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Base retry backoff in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Dispatch attempts before a permanent failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// JSON-RPC endpoint for `eth_gasPrice`. Unset means a fixed dev price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_rpc_url: Option<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-type rule overrides keyed by type name, e.g. `[rules.MESH_CLAIM]`.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleOverride>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_execution_interval_ms() -> u64 {
    30_000
}

fn default_max_batch_size() -> usize {
    50
}

fn default_monitor_interval_ms() -> u64 {
    10_000
}

fn default_status_interval_ms() -> u64 {
    60_000
}

fn default_retry_backoff_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

/// The two addresses every running scheduler needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GovernanceAddresses {
    pub safe: Address,
    pub safe_manager: Address,
}

impl SchedulerConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check everything the scheduler relies on. Missing governance
    /// addresses are fatal.
    pub fn validate(&self) -> Result<GovernanceAddresses, ConfigError> {
        let safe = self.safe_address.ok_or(ConfigError::Missing("SAFE_ADDRESS"))?;
        let safe_manager = self
            .safe_manager_address
            .ok_or(ConfigError::Missing("SAFE_MANAGER_ADDRESS"))?;
        if safe.is_zero() {
            return Err(invalid("SAFE_ADDRESS", "must not be the zero address"));
        }
        if safe_manager.is_zero() {
            return Err(invalid("SAFE_MANAGER_ADDRESS", "must not be the zero address"));
        }
        if self.execution_interval_ms == 0 {
            return Err(invalid("EXECUTION_INTERVAL", "must be positive"));
        }
        if self.monitor_interval_ms == 0 {
            return Err(invalid("MONITOR_INTERVAL", "must be positive"));
        }
        if self.status_interval_ms == 0 {
            return Err(invalid("STATUS_INTERVAL", "must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(invalid("MAX_BATCH_SIZE", "must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be positive"));
        }
        self.rule_set()?;
        Ok(GovernanceAddresses { safe, safe_manager })
    }

    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        RuleSet::from_overrides(&self.rules)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_backoff_ms.div_ceil(1000))
    }

    pub fn execution_interval(&self) -> Duration {
        Duration::from_millis(self.execution_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            safe_address: None,
            safe_manager_address: None,
            execution_interval_ms: default_execution_interval_ms(),
            max_batch_size: default_max_batch_size(),
            monitor_interval_ms: default_monitor_interval_ms(),
            status_interval_ms: default_status_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_attempts: default_max_attempts(),
            gas_rpc_url: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            rules: BTreeMap::new(),
        }
    }
}
