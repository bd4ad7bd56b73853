use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::{Money, TimeBand};

use super::{Engine, EngineError};

/// Price quote for one slot instance: the full price and the deposit
/// required to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub total: Money,
    pub deposit_required: Money,
}

/// Integer division rounding half up. All engine amounts are non-negative,
/// which keeps this exact and deterministic (no banker's rounding).
pub(super) fn round_half_up(numer: i128, denom: i128) -> Money {
    debug_assert!(numer >= 0 && denom > 0);
    ((numer + denom / 2) / denom) as Money
}

/// Weekend days and evening starts are peak; everything else is off-peak.
pub(super) fn band_for(date: NaiveDate, start: NaiveTime, config: &EngineConfig) -> TimeBand {
    let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend || (start >= config.peak_start && start < config.peak_end) {
        TimeBand::Peak
    } else {
        TimeBand::OffPeak
    }
}

pub(super) fn deposit_for(total: Money, config: &EngineConfig) -> Money {
    round_half_up(total as i128 * config.deposit_percent as i128, 100)
}

impl Engine {
    /// Quote a (court, date, interval) combination: hourly rate for the
    /// court's sport and the applicable band, scaled by duration, with the
    /// configured deposit percentage on top.
    pub fn quote(
        &self,
        court_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Quote, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidRange("slot start must precede end"));
        }
        let sport_id = self
            .courts
            .get(&court_id)
            .map(|c| c.sport_id)
            .ok_or(EngineError::NotFound(court_id))?;

        let band = band_for(date, start, &self.config);
        let rate = self
            .rates
            .get(&sport_id)
            .and_then(|card| card.rate_for(band))
            .ok_or(EngineError::NoRateDefined(sport_id))?;

        let minutes = (end - start).num_minutes();
        let total = round_half_up(rate as i128 * minutes as i128, 60);
        Ok(Quote {
            total,
            deposit_required: deposit_for(total, &self.config),
        })
    }
}
