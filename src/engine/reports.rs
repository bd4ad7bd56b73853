use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use ulid::Ulid;

use crate::model::*;

use super::availability::validate_range;
use super::{Engine, EngineError, SharedSlotBook};

pub(super) const DEFAULT_TOP_CLIENTS: usize = 20;

/// Truncate a date to the start of its reporting period. Weeks are ISO
/// weeks starting Monday.
pub(super) fn truncate_period(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => date.week(Weekday::Mon).first_day(),
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

pub(super) fn period_label(period: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day | Granularity::Week => period.format("%Y-%m-%d").to_string(),
        Granularity::Month => period.format("%Y-%m").to_string(),
    }
}

/// Occupancy percent in basis points: occupied/available × 100, two
/// decimals, half up. Zero availability is zero occupancy, not a division
/// failure.
pub(super) fn occupancy_basis_points(occupied: u64, available: u64) -> i64 {
    if available == 0 {
        return 0;
    }
    super::pricing::round_half_up(occupied as i128 * 10_000, available as i128)
}

fn ensure_ordered(from: NaiveDate, to: NaiveDate) -> Result<(), EngineError> {
    if from > to {
        return Err(EngineError::InvalidRange("from is after to"));
    }
    Ok(())
}

impl Engine {
    fn check_filters(
        &self,
        venue_id: Option<Ulid>,
        sport_id: Option<Ulid>,
    ) -> Result<(), EngineError> {
        if let Some(vid) = venue_id
            && !self.venues.contains_key(&vid)
        {
            return Err(EngineError::NotFound(vid));
        }
        if let Some(sid) = sport_id
            && !self.sports.contains_key(&sid)
        {
            return Err(EngineError::NotFound(sid));
        }
        Ok(())
    }

    /// Snapshot every reservation dated within [from, to], joined to its
    /// court, honoring optional venue/sport filters. All aggregations
    /// derive from this one read pass.
    async fn collect_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        venue_id: Option<Ulid>,
        sport_id: Option<Ulid>,
    ) -> Vec<(Reservation, Court)> {
        let book_arcs: Vec<SharedSlotBook> =
            self.books.iter().map(|e| e.value().clone()).collect();

        let mut out = Vec::new();
        for book in book_arcs {
            let guard = book.read().await;
            let Some(court_id) = self.slots.get(&guard.slot_id).map(|s| s.court_id) else {
                continue;
            };
            let Some(court) = self.courts.get(&court_id).map(|c| c.value().clone()) else {
                continue;
            };
            if let Some(vid) = venue_id
                && court.venue_id != vid
            {
                continue;
            }
            if let Some(sid) = sport_id
                && court.sport_id != sid
            {
                continue;
            }
            out.extend(guard.in_range(from, to).map(|r| (r.clone(), court.clone())));
        }
        out
    }

    /// Revenue grouped by day/week/month of the reservation date, counting
    /// only confirmed and finalized reservations, ascending by period.
    pub async fn revenue_by_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        granularity: Granularity,
        venue_id: Option<Ulid>,
        sport_id: Option<Ulid>,
    ) -> Result<Vec<PeriodRevenue>, EngineError> {
        ensure_ordered(from, to)?;
        self.check_filters(venue_id, sport_id)?;

        let grouped: BTreeMap<NaiveDate, (u64, Money, Money)> = self
            .collect_range(from, to, venue_id, sport_id)
            .await
            .into_iter()
            .filter(|(r, _)| r.state.is_revenue())
            .fold(BTreeMap::new(), |mut acc, (r, _)| {
                let key = truncate_period(r.date, granularity);
                let entry = acc.entry(key).or_insert((0, 0, 0));
                entry.0 += 1;
                entry.1 += r.total;
                entry.2 += r.deposit_paid;
                acc
            });

        Ok(grouped
            .into_iter()
            .map(|(period, (count, revenue, deposits))| PeriodRevenue {
                period: period_label(period, granularity),
                reservation_count: count,
                total_revenue: revenue,
                total_deposits: deposits,
            })
            .collect())
    }

    /// Revenue grouped by sport, descending by revenue, ties ascending by id.
    pub async fn revenue_by_sport(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        venue_id: Option<Ulid>,
    ) -> Result<Vec<GroupRevenue>, EngineError> {
        ensure_ordered(from, to)?;
        self.check_filters(venue_id, None)?;
        let rows = self.collect_range(from, to, venue_id, None).await;
        let names = |id: &Ulid| self.sports.get(id).map(|s| s.name.clone());
        Ok(group_revenue(rows, |court| court.sport_id, names))
    }

    /// Revenue grouped by venue, descending by revenue, ties ascending by id.
    pub async fn revenue_by_venue(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        sport_id: Option<Ulid>,
    ) -> Result<Vec<GroupRevenue>, EngineError> {
        ensure_ordered(from, to)?;
        self.check_filters(None, sport_id)?;
        let rows = self.collect_range(from, to, None, sport_id).await;
        let names = |id: &Ulid| self.venues.get(id).map(|v| v.name.clone());
        Ok(group_revenue(rows, |court| court.venue_id, names))
    }

    /// Per-court occupancy over [from, to]: available (slot, date) pairs
    /// from the active catalog against non-cancelled reservations, sorted
    /// descending by occupancy, with top/bottom-3 summaries.
    ///
    /// The range shares the availability cap — this expands slots × days.
    pub async fn occupancy_by_court(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        venue_id: Option<Ulid>,
    ) -> Result<OccupancyReport, EngineError> {
        self.check_filters(venue_id, None)?;
        let days = validate_range(from, to, self.config.max_range_days)? as u64;

        let mut per_court: BTreeMap<Ulid, (Court, u64, u64)> = BTreeMap::new();
        for c in self.courts.iter() {
            if let Some(vid) = venue_id
                && c.venue_id != vid
            {
                continue;
            }
            per_court.insert(c.id, (c.value().clone(), 0, 0));
        }

        // Available pairs: active slots on active courts only.
        for entry in per_court.values_mut() {
            let (court, available, _) = entry;
            if !court.active {
                continue;
            }
            if let Some(slot_ids) = self.slots_by_court.get(&court.id) {
                let active_slots = slot_ids
                    .iter()
                    .filter(|id| self.slots.get(id).is_some_and(|s| s.active))
                    .count() as u64;
                *available = active_slots * days;
            }
        }

        // Occupied pairs: every non-cancelled reservation in range, even on
        // since-deactivated slots.
        for (r, court) in self.collect_range(from, to, venue_id, None).await {
            if r.state.occupies()
                && let Some(entry) = per_court.get_mut(&court.id)
            {
                entry.2 += 1;
            }
        }

        let mut scored: Vec<(i64, CourtOccupancy)> = per_court
            .into_values()
            .map(|(court, available, occupied)| {
                let bp = occupancy_basis_points(occupied, available);
                (
                    bp,
                    CourtOccupancy {
                        court_id: court.id,
                        venue_id: court.venue_id,
                        court_number: court.number,
                        slots_available: available,
                        slots_occupied: occupied,
                        occupancy_percent: bp as f64 / 100.0,
                    },
                )
            })
            .collect();
        scored.sort_by_key(|(bp, row)| (Reverse(*bp), row.court_id));

        let courts: Vec<CourtOccupancy> = scored.into_iter().map(|(_, row)| row).collect();
        let top = courts.iter().take(3).cloned().collect();
        let bottom = courts.iter().rev().take(3).cloned().collect();
        Ok(OccupancyReport {
            courts,
            top,
            bottom,
        })
    }

    /// Most active clients over [from, to] by confirmed/finalized
    /// reservation count, descending; ties ascending by client id.
    pub async fn top_clients(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<ClientActivity>, EngineError> {
        ensure_ordered(from, to)?;
        let limit = limit.unwrap_or(DEFAULT_TOP_CLIENTS);

        let mut grouped: BTreeMap<Ulid, (u64, Money, NaiveDate, NaiveDate)> = BTreeMap::new();
        for (r, _) in self.collect_range(from, to, None, None).await {
            if !r.state.is_revenue() {
                continue;
            }
            grouped
                .entry(r.client_id)
                .and_modify(|(count, spend, first, last)| {
                    *count += 1;
                    *spend += r.total;
                    *first = (*first).min(r.date);
                    *last = (*last).max(r.date);
                })
                .or_insert((1, r.total, r.date, r.date));
        }

        let mut rows: Vec<ClientActivity> = grouped
            .into_iter()
            .filter_map(|(client_id, (count, spend, first, last))| {
                let client = self.clients.get(&client_id)?;
                Some(ClientActivity {
                    client_id,
                    name: client.name.clone(),
                    surname: client.surname.clone(),
                    reservation_count: count,
                    total_spend: spend,
                    avg_spend: super::pricing::round_half_up(spend as i128, count as i128),
                    first_reservation: first,
                    last_reservation: last,
                })
            })
            .collect();
        rows.sort_by_key(|r| (Reverse(r.reservation_count), r.client_id));
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Shared grouped-revenue pipeline: fold rows by key, join the display
/// name, order descending by revenue with ascending-id tie-break.
fn group_revenue(
    rows: Vec<(Reservation, Court)>,
    key: impl Fn(&Court) -> Ulid,
    name: impl Fn(&Ulid) -> Option<String>,
) -> Vec<GroupRevenue> {
    let grouped: BTreeMap<Ulid, (u64, Money)> = rows
        .into_iter()
        .filter(|(r, _)| r.state.is_revenue())
        .fold(BTreeMap::new(), |mut acc, (r, court)| {
            let entry = acc.entry(key(&court)).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += r.total;
            acc
        });

    let mut out: Vec<GroupRevenue> = grouped
        .into_iter()
        .map(|(id, (count, revenue))| GroupRevenue {
            id,
            name: name(&id).unwrap_or_default(),
            reservation_count: count,
            total_revenue: revenue,
        })
        .collect();
    out.sort_by_key(|g| (Reverse(g.total_revenue), g.id));
    out
}
