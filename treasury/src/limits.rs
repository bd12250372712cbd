//! Auto-transfer limits and lazily rolled day-bucket accounting.

use keel_types::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Self-service limits configured for one spender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoLimit {
    pub per_tx: Amount,
    pub daily: Amount,
    pub enabled: bool,
}

/// Spend accumulated by one spender within one day-bucket.
///
/// There is no scheduled reset: every access goes through [`DailySpend::rolled`],
/// which starts a fresh bucket when the stored one is stale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySpend {
    pub last_bucket: u64,
    pub spent_in_bucket: Amount,
}

impl DailySpend {
    /// This record as seen at `now`: unchanged within the same bucket,
    /// zeroed when the day has rolled over.
    pub fn rolled(self, now: Timestamp) -> Self {
        let bucket = now.day_bucket();
        if bucket == self.last_bucket {
            self
        } else {
            Self {
                last_bucket: bucket,
                spent_in_bucket: Amount::ZERO,
            }
        }
    }

    /// Headroom left under `limit` at `now`.
    pub fn remaining(self, limit: Amount, now: Timestamp) -> Amount {
        limit.saturating_sub(self.rolled(now).spent_in_bucket)
    }
}
