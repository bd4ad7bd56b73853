use std::time::Duration;

use chrono::NaiveTime;

use crate::model::Money;

/// Tunable engine parameters. Every value here is a policy knob, not a
/// correctness constant: deployments override them via `TURNERO_*` env vars.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum inclusive span, in days, accepted by availability and
    /// occupancy queries.
    pub max_range_days: i64,
    /// Deposit required to confirm, as a percentage of the total price.
    pub deposit_percent: u32,
    /// How far a confirmed deposit may exceed the total before being
    /// rejected. The stored deposit is still clamped to the total.
    pub deposit_tolerance: Money,
    /// How far a caller-proposed price may differ from the quoted total.
    pub price_tolerance: Money,
    /// Slots starting inside `[peak_start, peak_end)` are priced at the
    /// peak rate. Weekend slots are always peak.
    pub peak_start: NaiveTime,
    pub peak_end: NaiveTime,
    /// Bound on lock acquisition for mutating operations.
    pub op_timeout: Duration,
    /// WAL appends between background compactions.
    pub compact_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_range_days: 90,
            deposit_percent: 30,
            deposit_tolerance: 0,
            price_tolerance: 0,
            peak_start: NaiveTime::from_hms_opt(18, 0, 0).expect("literal time"),
            peak_end: NaiveTime::from_hms_opt(23, 0, 0).expect("literal time"),
            op_timeout: Duration::from_secs(5),
            compact_threshold: 1000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_range_days: env_parse("TURNERO_MAX_RANGE_DAYS")
                .unwrap_or(defaults.max_range_days),
            deposit_percent: env_parse("TURNERO_DEPOSIT_PERCENT")
                .unwrap_or(defaults.deposit_percent),
            deposit_tolerance: env_parse("TURNERO_DEPOSIT_TOLERANCE")
                .unwrap_or(defaults.deposit_tolerance),
            price_tolerance: env_parse("TURNERO_PRICE_TOLERANCE")
                .unwrap_or(defaults.price_tolerance),
            peak_start: env_parse("TURNERO_PEAK_START").unwrap_or(defaults.peak_start),
            peak_end: env_parse("TURNERO_PEAK_END").unwrap_or(defaults.peak_end),
            op_timeout: env_parse("TURNERO_OP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.op_timeout),
            compact_threshold: env_parse("TURNERO_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        }
    }
}
