//! Per-type execution rules: enabled flag, minimum spacing, gas ceiling,
//! default priority.

use std::collections::BTreeMap;

use keel_governance::OperationType;
use keel_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Wei per gwei.
pub const GWEI: u128 = 1_000_000_000;

/// Lowest priority an item can decay to.
pub const MIN_PRIORITY: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRule {
    pub enabled: bool,
    /// Minimum seconds between two successful executions of this type.
    pub min_interval_secs: u64,
    /// `None` means no ceiling.
    pub max_gas_price_gwei: Option<u64>,
    /// Default priority for new items of this type; higher runs sooner.
    pub priority: u8,
}

impl ExecutionRule {
    pub fn defaults_for(op_type: OperationType) -> Self {
        let (min_interval_secs, max_gas_price_gwei, priority) = match op_type {
            OperationType::MeshClaim => (60, Some(5), 8),
            OperationType::MeshWithdraw => (60, Some(5), 7),
            OperationType::RewardSet => (300, Some(10), 6),
            OperationType::RewardWithdraw => (300, Some(10), 5),
            OperationType::Stake => (120, Some(8), 7),
            OperationType::StakeWithdraw => (120, Some(8), 7),
            OperationType::EmergencyPause | OperationType::EmergencyResume => (0, None, 10),
        };
        Self {
            enabled: true,
            min_interval_secs,
            max_gas_price_gwei,
            priority,
        }
    }

    pub fn max_gas_price_wei(&self) -> Option<u128> {
        self.max_gas_price_gwei.map(|gwei| u128::from(gwei) * GWEI)
    }

    /// Seconds left before this type may run again, if any.
    pub fn wait_remaining(&self, last_success: Option<Timestamp>, now: Timestamp) -> Option<u64> {
        let last = last_success?;
        let elapsed = last.elapsed_since(now);
        (elapsed < self.min_interval_secs).then(|| self.min_interval_secs - elapsed)
    }
}

/// Partial rule from a config file; unset fields keep the type's default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gas_price_gwei: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

/// A complete rule for every operation type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<OperationType, ExecutionRule>,
}

impl RuleSet {
    /// Layer `overrides` (keyed by type name, e.g. `MESH_CLAIM`) over the
    /// built-in defaults.
    pub fn from_overrides(overrides: &BTreeMap<String, RuleOverride>) -> Result<Self, ConfigError> {
        let mut set = Self::default();
        for (name, o) in overrides {
            let op_type: OperationType = name.parse().map_err(|reason| ConfigError::Invalid {
                key: format!("rules.{name}"),
                reason,
            })?;
            if o.priority == Some(0) {
                return Err(ConfigError::Invalid {
                    key: format!("rules.{name}.priority"),
                    reason: "priority must be at least 1".into(),
                });
            }
            let rule = set
                .rules
                .entry(op_type)
                .or_insert_with(|| ExecutionRule::defaults_for(op_type));
            if let Some(enabled) = o.enabled {
                rule.enabled = enabled;
            }
            if let Some(secs) = o.min_interval_secs {
                rule.min_interval_secs = secs;
            }
            if let Some(gwei) = o.max_gas_price_gwei {
                rule.max_gas_price_gwei = Some(gwei);
            }
            if let Some(priority) = o.priority {
                rule.priority = priority;
            }
        }
        Ok(set)
    }

    pub fn rule_for(&self, op_type: OperationType) -> ExecutionRule {
        self.rules
            .get(&op_type)
            .copied()
            .unwrap_or_else(|| ExecutionRule::defaults_for(op_type))
    }

    pub fn set(&mut self, op_type: OperationType, rule: ExecutionRule) {
        self.rules.insert(op_type, rule);
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: OperationType::ALL
                .into_iter()
                .map(|t| (t, ExecutionRule::defaults_for(t)))
                .collect(),
        }
    }
}
