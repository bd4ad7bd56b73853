use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Validate an inclusive [from, to] query window against the configured
/// maximum span. Returns the number of days in the window.
pub(super) fn validate_range(
    from: NaiveDate,
    to: NaiveDate,
    max_days: i64,
) -> Result<i64, EngineError> {
    if from > to {
        return Err(EngineError::InvalidRange("from is after to"));
    }
    let days = (to - from).num_days() + 1;
    if days > max_days {
        return Err(EngineError::InvalidRange("range exceeds maximum span"));
    }
    Ok(days)
}

/// Status of one (slot, date) pair against a ledger snapshot. A pending
/// occupant is still a hold, so the occupying state is reported.
pub(super) fn day_status(book: &SlotBook, date: NaiveDate) -> SlotStatus {
    match book.active_on(date) {
        Some(r) => SlotStatus::Occupied {
            reservation_id: r.id,
            state: r.state,
        },
        None => SlotStatus::Free,
    }
}

impl Engine {
    /// Expand the slot catalog of a venue (optionally one sport) across
    /// every date in [from, to] and mark each (slot, date) pair free or
    /// occupied. O(slots × days).
    ///
    /// Deactivated slots offer no new availability but any date still held
    /// by a non-cancelled reservation is reported as occupied, so history
    /// never silently disappears from the grid.
    pub async fn availability(
        &self,
        venue_id: Ulid,
        sport_id: Option<Ulid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SlotDay>, EngineError> {
        if !self.venues.contains_key(&venue_id) {
            return Err(EngineError::NotFound(venue_id));
        }
        if let Some(sid) = sport_id
            && !self.sports.contains_key(&sid)
        {
            return Err(EngineError::NotFound(sid));
        }
        validate_range(from, to, self.config.max_range_days)?;

        let mut out = Vec::new();
        for (court, slot) in self.venue_slots(venue_id, sport_id) {
            let Some(book) = self.get_book(&slot.id) else {
                continue;
            };
            let guard = book.read().await;

            for date in from.iter_days().take_while(|d| *d <= to) {
                let status = day_status(&guard, date);
                if !slot.active && status == SlotStatus::Free {
                    continue;
                }
                out.push(SlotDay {
                    slot_id: slot.id,
                    court_id: court.id,
                    court_number: court.number,
                    date,
                    start: slot.start,
                    end: slot.end,
                    status,
                });
            }
        }

        out.sort_by(|a, b| {
            (a.date, a.court_number, a.start).cmp(&(b.date, b.court_number, b.start))
        });
        Ok(out)
    }
}
