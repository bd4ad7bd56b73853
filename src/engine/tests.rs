use super::*;

use chrono::{Days, NaiveDate, NaiveTime, Utc};
use tokio_test::assert_ok;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("turnero_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn t(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn open_engine(path: PathBuf, config: EngineConfig) -> Engine {
    Engine::new(path, Arc::new(NotifyHub::new()), config).unwrap()
}

/// One venue, one padel court with a daily 18:00–19:00 slot, off-peak rate
/// 1000/h (which also covers peak via fallback), one registered client.
struct Seeded {
    engine: Engine,
    venue: Venue,
    sport: Sport,
    court: Court,
    slot: Slot,
    client: Client,
}

async fn seeded_with(name: &str, config: EngineConfig) -> Seeded {
    let engine = open_engine(test_wal_path(name), config);
    let venue = engine.create_venue("Club Centro", "Calle Falsa 123").await.unwrap();
    let sport = engine.create_sport("padel").await.unwrap();
    let court = engine.create_court(venue.id, sport.id, 1).await.unwrap();
    let slot = engine.create_slot(court.id, t(18), t(19)).await.unwrap();
    engine.set_rate(sport.id, TimeBand::OffPeak, 1000).await.unwrap();
    let client = engine
        .register_client("Ana", "García", "555-0101", "ana@example.com")
        .await
        .unwrap();
    Seeded {
        engine,
        venue,
        sport,
        court,
        slot,
        client,
    }
}

async fn seeded(name: &str) -> Seeded {
    seeded_with(name, EngineConfig::default()).await
}

// ── Catalog ──────────────────────────────────────────────

#[tokio::test]
async fn catalog_lists_active_slots_in_order() {
    let s = seeded("catalog_list.wal").await;
    let late = s.engine.create_slot(s.court.id, t(20), t(21)).await.unwrap();

    let slots = s.engine.list_slots(s.venue.id, None).unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].id, s.slot.id);
    assert_eq!(slots[1].id, late.id);
}

#[tokio::test]
async fn catalog_sport_filter() {
    let s = seeded("catalog_filter.wal").await;
    let tennis = s.engine.create_sport("tenis").await.unwrap();
    let tennis_court = s.engine.create_court(s.venue.id, tennis.id, 2).await.unwrap();
    let tennis_slot = s.engine.create_slot(tennis_court.id, t(10), t(11)).await.unwrap();

    let padel_only = s.engine.list_slots(s.venue.id, Some(s.sport.id)).unwrap();
    assert_eq!(padel_only.len(), 1);
    assert_eq!(padel_only[0].id, s.slot.id);

    let tennis_only = s.engine.list_slots(s.venue.id, Some(tennis.id)).unwrap();
    assert_eq!(tennis_only.len(), 1);
    assert_eq!(tennis_only[0].id, tennis_slot.id);
}

#[tokio::test]
async fn catalog_unknown_venue_or_sport_fails() {
    let s = seeded("catalog_unknown.wal").await;
    assert!(matches!(
        s.engine.list_slots(Ulid::new(), None),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        s.engine.list_slots(s.venue.id, Some(Ulid::new())),
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn catalog_rejects_overlapping_slot_templates() {
    let s = seeded("catalog_overlap.wal").await;
    // 18:00–20:00 collides with the seeded 18:00–19:00
    let result = s.engine.create_slot(s.court.id, t(18), t(20)).await;
    assert!(matches!(result, Err(EngineError::SlotUnavailable(_))));

    // Adjacent is fine
    assert_ok!(s.engine.create_slot(s.court.id, t(19), t(20)).await);

    // Reversed bounds are malformed
    assert!(matches!(
        s.engine.create_slot(s.court.id, t(20), t(19)).await,
        Err(EngineError::InvalidRange(_))
    ));
}

#[tokio::test]
async fn catalog_deactivated_slot_not_listed() {
    let s = seeded("catalog_deactivate.wal").await;
    s.engine.deactivate_slot(s.slot.id).await.unwrap();
    assert!(s.engine.list_slots(s.venue.id, None).unwrap().is_empty());
}

#[tokio::test]
async fn catalog_court_requires_known_refs() {
    let s = seeded("catalog_court_refs.wal").await;
    assert!(matches!(
        s.engine.create_court(Ulid::new(), s.sport.id, 9).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        s.engine.create_court(s.venue.id, Ulid::new(), 9).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Pricing ──────────────────────────────────────────────

#[tokio::test]
async fn quote_peak_falls_back_to_base_rate() {
    let s = seeded("quote_fallback.wal").await;
    // Monday evening is peak; no dedicated peak rate → off-peak 1000 applies
    let q = s.engine.quote(s.court.id, d(2024, 6, 3), t(18), t(19)).unwrap();
    assert_eq!(q.total, 1000);
    assert_eq!(q.deposit_required, 300);
}

#[tokio::test]
async fn quote_uses_dedicated_peak_rate() {
    let s = seeded("quote_peak.wal").await;
    s.engine.set_rate(s.sport.id, TimeBand::Peak, 1500).await.unwrap();

    // Monday morning: off-peak
    let morning = s.engine.quote(s.court.id, d(2024, 6, 3), t(10), t(11)).unwrap();
    assert_eq!(morning.total, 1000);

    // Monday evening: peak
    let evening = s.engine.quote(s.court.id, d(2024, 6, 3), t(18), t(19)).unwrap();
    assert_eq!(evening.total, 1500);

    // Saturday morning: weekend is always peak
    let weekend = s.engine.quote(s.court.id, d(2024, 6, 1), t(10), t(11)).unwrap();
    assert_eq!(weekend.total, 1500);
}

#[tokio::test]
async fn quote_scales_by_duration_and_rounds_half_up() {
    let s = seeded("quote_rounding.wal").await;
    s.engine.set_rate(s.sport.id, TimeBand::OffPeak, 1001).await.unwrap();

    // 90 minutes at 1001/h → 1501.5 → 1502; deposit 450.6 → 451
    let q = s
        .engine
        .quote(s.court.id, d(2024, 6, 3), t(10), NaiveTime::from_hms_opt(11, 30, 0).unwrap())
        .unwrap();
    assert_eq!(q.total, 1502);
    assert_eq!(q.deposit_required, 451);
}

#[tokio::test]
async fn quote_without_rate_fails() {
    let s = seeded("quote_no_rate.wal").await;
    let squash = s.engine.create_sport("squash").await.unwrap();
    let court = s.engine.create_court(s.venue.id, squash.id, 3).await.unwrap();
    assert!(matches!(
        s.engine.quote(court.id, d(2024, 6, 3), t(10), t(11)),
        Err(EngineError::NoRateDefined(_))
    ));
    assert!(matches!(
        s.engine.quote(Ulid::new(), d(2024, 6, 3), t(10), t(11)),
        Err(EngineError::NotFound(_))
    ));
}

// ── Reservation lifecycle ────────────────────────────────

#[tokio::test]
async fn booking_scenario_end_to_end() {
    let s = seeded("scenario.wal").await;
    let date = d(2024, 6, 1);

    // Book: priced at 1000, 30% deposit, held as pending
    let r = s
        .engine
        .create_reservation(s.slot.id, date, s.client.id, None)
        .await
        .unwrap();
    assert_eq!(r.total, 1000);
    assert_eq!(r.deposit_required, 300);
    assert_eq!(r.state, ReservationState::Pending);

    // Same (slot, date) again: conflict names the occupying reservation
    let other = s
        .engine
        .register_client("Bruno", "Díaz", "555-0102", "bruno@example.com")
        .await
        .unwrap();
    match s.engine.create_reservation(s.slot.id, date, other.id, None).await {
        Err(EngineError::SlotUnavailable(id)) => assert_eq!(id, r.id),
        out => panic!("expected SlotUnavailable, got {out:?}"),
    }

    // Confirm with the exact deposit
    let confirmed = s.engine.confirm_reservation(r.id, 300).await.unwrap();
    assert_eq!(confirmed.state, ReservationState::Confirmed);
    assert_eq!(confirmed.deposit_paid, 300);

    // Availability shows the pair occupied by a confirmed reservation
    let grid = s
        .engine
        .availability(s.venue.id, None, date, date)
        .await
        .unwrap();
    assert_eq!(grid.len(), 1);
    assert_eq!(
        grid[0].status,
        SlotStatus::Occupied {
            reservation_id: r.id,
            state: ReservationState::Confirmed
        }
    );

    // Cancelling frees the key: a new booking for the same pair succeeds
    s.engine.cancel_reservation(r.id, "client no-show").await.unwrap();
    assert_ok!(s.engine.create_reservation(s.slot.id, date, other.id, None).await);
}

#[tokio::test]
async fn confirm_validates_amounts() {
    let s = seeded("confirm_amounts.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();

    assert!(matches!(
        s.engine.confirm_reservation(r.id, -1).await,
        Err(EngineError::InvalidAmount(_))
    ));
    assert!(matches!(
        s.engine.confirm_reservation(r.id, 1001).await,
        Err(EngineError::InvalidAmount(_))
    ));

    // Paying the full total up front is allowed
    let confirmed = s.engine.confirm_reservation(r.id, 1000).await.unwrap();
    assert_eq!(confirmed.deposit_paid, 1000);
}

#[tokio::test]
async fn confirm_only_from_pending() {
    let s = seeded("confirm_state.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(r.id, 300).await.unwrap();

    assert!(matches!(
        s.engine.confirm_reservation(r.id, 300).await,
        Err(EngineError::InvalidTransition {
            from: ReservationState::Confirmed
        })
    ));
}

#[tokio::test]
async fn deposit_tolerance_admits_overpay_but_clamps() {
    let mut config = EngineConfig::default();
    config.deposit_tolerance = 50;
    let s = seeded_with("confirm_clamp.wal", config).await;

    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();

    // 1030 is within tolerance of the 1000 total, but the stored deposit
    // never exceeds the total.
    let confirmed = s.engine.confirm_reservation(r.id, 1030).await.unwrap();
    assert_eq!(confirmed.deposit_paid, 1000);
    assert!(confirmed.deposit_paid <= confirmed.total);

    let stored = s.engine.get_reservation(&r.id).await.unwrap();
    assert_eq!(stored.deposit_paid, 1000);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let s = seeded("cancel_idempotent.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();

    let first = s.engine.cancel_reservation(r.id, "rain").await.unwrap();
    assert_eq!(first.state, ReservationState::Cancelled);
    assert_eq!(first.cancel_reason.as_deref(), Some("rain"));

    // Second cancel: success, no-op, reason untouched
    let second = s.engine.cancel_reservation(r.id, "different reason").await.unwrap();
    assert_eq!(second.state, ReservationState::Cancelled);
    assert_eq!(second.cancel_reason.as_deref(), Some("rain"));
}

#[tokio::test]
async fn cancel_after_finalize_fails() {
    let s = seeded("cancel_finalized.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(r.id, 300).await.unwrap();
    s.engine.finalize_reservation(r.id).await.unwrap();

    assert!(matches!(
        s.engine.cancel_reservation(r.id, "too late").await,
        Err(EngineError::InvalidTransition {
            from: ReservationState::Finalized
        })
    ));
}

#[tokio::test]
async fn finalize_happy_path_and_guards() {
    let s = seeded("finalize.wal").await;
    let past = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();

    // Not confirmed yet
    assert!(matches!(
        s.engine.finalize_reservation(past.id).await,
        Err(EngineError::InvalidTransition {
            from: ReservationState::Pending
        })
    ));

    s.engine.confirm_reservation(past.id, 300).await.unwrap();
    let done = s.engine.finalize_reservation(past.id).await.unwrap();
    assert_eq!(done.state, ReservationState::Finalized);
}

#[tokio::test]
async fn finalize_future_reservation_is_too_early() {
    let s = seeded("finalize_early.wal").await;
    let future_date = Utc::now().date_naive().checked_add_days(Days::new(30)).unwrap();

    let r = s
        .engine
        .create_reservation(s.slot.id, future_date, s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(r.id, 300).await.unwrap();

    match s.engine.finalize_reservation(r.id).await {
        Err(EngineError::TooEarly { date }) => assert_eq!(date, future_date),
        out => panic!("expected TooEarly, got {out:?}"),
    }
}

#[tokio::test]
async fn requested_price_override() {
    let mut config = EngineConfig::default();
    config.price_tolerance = 100;
    let s = seeded_with("price_override.wal", config).await;

    // Within tolerance: becomes the agreed total, deposit re-derived
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, Some(950))
        .await
        .unwrap();
    assert_eq!(r.total, 950);
    assert_eq!(r.deposit_required, 285);

    // Outside tolerance
    assert!(matches!(
        s.engine
            .create_reservation(s.slot.id, d(2024, 6, 2), s.client.id, Some(1200))
            .await,
        Err(EngineError::InvalidAmount(_))
    ));
    // Negative is never a price
    assert!(matches!(
        s.engine
            .create_reservation(s.slot.id, d(2024, 6, 2), s.client.id, Some(-5))
            .await,
        Err(EngineError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn booking_requires_known_slot_and_client() {
    let s = seeded("booking_refs.wal").await;
    assert!(matches!(
        s.engine
            .create_reservation(Ulid::new(), d(2024, 6, 1), s.client.id, None)
            .await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        s.engine
            .create_reservation(s.slot.id, d(2024, 6, 1), Ulid::new(), None)
            .await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn booking_deactivated_slot_or_court_unavailable() {
    let s = seeded("booking_inactive.wal").await;
    let second = s.engine.create_slot(s.court.id, t(19), t(20)).await.unwrap();

    s.engine.deactivate_slot(second.id).await.unwrap();
    assert!(matches!(
        s.engine
            .create_reservation(second.id, d(2024, 6, 1), s.client.id, None)
            .await,
        Err(EngineError::SlotUnavailable(_))
    ));

    s.engine.deactivate_court(s.court.id).await.unwrap();
    assert!(matches!(
        s.engine
            .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
            .await,
        Err(EngineError::SlotUnavailable(_))
    ));
}

#[tokio::test]
async fn concurrent_bookings_resolve_to_one_winner() {
    let s = seeded("booking_race.wal").await;
    let engine = Arc::new(s.engine);
    let date = d(2024, 6, 1);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let client_id = s.client.id;
        let slot_id = s.slot.id;
        handles.push(tokio::spawn(async move {
            engine.create_reservation(slot_id, date, client_id, None).await
        }));
    }

    let mut won = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::SlotUnavailable(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn held_lock_times_out_without_writing() {
    let mut config = EngineConfig::default();
    config.op_timeout = std::time::Duration::from_millis(50);
    let s = seeded_with("booking_timeout.wal", config).await;

    let book = s.engine.get_book(&s.slot.id).unwrap();
    let guard = book.clone().write_owned().await;

    let result = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await;
    assert!(matches!(result, Err(EngineError::Timeout)));

    drop(guard);
    // Nothing was written: the pair is still bookable
    assert_ok!(
        s.engine
            .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
            .await
    );
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_catalog_and_reservations() {
    let path = test_wal_path("replay.wal");
    let (venue_id, slot_id, client_id, res_id) = {
        let s = seeded_with("replay.wal", EngineConfig::default()).await;
        let r = s
            .engine
            .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
            .await
            .unwrap();
        s.engine.confirm_reservation(r.id, 300).await.unwrap();
        (s.venue.id, s.slot.id, s.client.id, r.id)
    };

    let reopened = open_engine(path, EngineConfig::default());
    let restored = reopened.get_reservation(&res_id).await.unwrap();
    assert_eq!(restored.state, ReservationState::Confirmed);
    assert_eq!(restored.deposit_paid, 300);

    // The conflict is still enforced after restart
    assert!(matches!(
        reopened
            .create_reservation(slot_id, d(2024, 6, 1), client_id, None)
            .await,
        Err(EngineError::SlotUnavailable(_))
    ));

    let grid = reopened
        .availability(venue_id, None, d(2024, 6, 1), d(2024, 6, 1))
        .await
        .unwrap();
    assert_eq!(
        grid[0].status,
        SlotStatus::Occupied {
            reservation_id: res_id,
            state: ReservationState::Confirmed
        }
    );
}

#[tokio::test]
async fn replay_after_cancel_allows_rebooking() {
    let path = test_wal_path("replay_cancel.wal");
    let (slot_id, client_id) = {
        let s = seeded_with("replay_cancel.wal", EngineConfig::default()).await;
        let r = s
            .engine
            .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
            .await
            .unwrap();
        s.engine.cancel_reservation(r.id, "weather").await.unwrap();
        (s.slot.id, s.client.id)
    };

    let reopened = open_engine(path, EngineConfig::default());
    assert_ok!(
        reopened
            .create_reservation(slot_id, d(2024, 6, 1), client_id, None)
            .await
    );
}

#[tokio::test]
async fn compaction_preserves_reservation_history() {
    let path = test_wal_path("compact_history.wal");
    let s = seeded_with("compact_history.wal", EngineConfig::default()).await;

    let cancelled = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(cancelled.id, 300).await.unwrap();
    s.engine.cancel_reservation(cancelled.id, "injury").await.unwrap();

    let live = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(live.id, 300).await.unwrap();
    s.engine.finalize_reservation(live.id).await.unwrap();

    s.engine.compact_wal().await.unwrap();
    drop(s);

    let reopened = open_engine(path, EngineConfig::default());
    let old = reopened.get_reservation(&cancelled.id).await.unwrap();
    assert_eq!(old.state, ReservationState::Cancelled);
    assert_eq!(old.cancel_reason.as_deref(), Some("injury"));
    assert_eq!(old.deposit_paid, 300);

    let kept = reopened.get_reservation(&live.id).await.unwrap();
    assert_eq!(kept.state, ReservationState::Finalized);
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn availability_validates_range() {
    let s = seeded("avail_range.wal").await;
    assert!(matches!(
        s.engine
            .availability(s.venue.id, None, d(2024, 6, 2), d(2024, 6, 1))
            .await,
        Err(EngineError::InvalidRange(_))
    ));
    // 91 inclusive days on the default 90-day cap
    assert!(matches!(
        s.engine
            .availability(s.venue.id, None, d(2024, 6, 1), d(2024, 8, 30))
            .await,
        Err(EngineError::InvalidRange(_))
    ));
    assert!(matches!(
        s.engine
            .availability(Ulid::new(), None, d(2024, 6, 1), d(2024, 6, 1))
            .await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn availability_expands_slots_across_dates() {
    let s = seeded("avail_expand.wal").await;
    s.engine.create_slot(s.court.id, t(19), t(20)).await.unwrap();

    let grid = s
        .engine
        .availability(s.venue.id, None, d(2024, 6, 1), d(2024, 6, 3))
        .await
        .unwrap();
    // 2 slots × 3 days, all free
    assert_eq!(grid.len(), 6);
    assert!(grid.iter().all(|sd| sd.status == SlotStatus::Free));
    // Ordered by date, then start time
    assert_eq!(grid[0].date, d(2024, 6, 1));
    assert_eq!(grid[0].start, t(18));
    assert_eq!(grid[1].start, t(19));
    assert_eq!(grid[5].date, d(2024, 6, 3));
}

#[tokio::test]
async fn availability_reports_pending_as_soft_hold() {
    let s = seeded("avail_pending.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 2), s.client.id, None)
        .await
        .unwrap();

    let grid = s
        .engine
        .availability(s.venue.id, None, d(2024, 6, 1), d(2024, 6, 3))
        .await
        .unwrap();
    assert_eq!(grid.len(), 3);
    assert_eq!(grid[0].status, SlotStatus::Free);
    assert_eq!(
        grid[1].status,
        SlotStatus::Occupied {
            reservation_id: r.id,
            state: ReservationState::Pending
        }
    );
    assert_eq!(grid[2].status, SlotStatus::Free);
}

#[tokio::test]
async fn availability_deactivated_slot_keeps_bookings_visible() {
    let s = seeded("avail_deactivated.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 2), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(r.id, 300).await.unwrap();
    s.engine.deactivate_slot(s.slot.id).await.unwrap();

    let grid = s
        .engine
        .availability(s.venue.id, None, d(2024, 6, 1), d(2024, 6, 3))
        .await
        .unwrap();
    // No free rows for the dead template — only the booked date remains
    assert_eq!(grid.len(), 1);
    assert_eq!(grid[0].date, d(2024, 6, 2));
    assert_eq!(
        grid[0].status,
        SlotStatus::Occupied {
            reservation_id: r.id,
            state: ReservationState::Confirmed
        }
    );
}

// ── Reports ──────────────────────────────────────────────

#[tokio::test]
async fn revenue_by_period_groups_by_month() {
    let s = seeded("rev_month.wal").await;
    // Second court with a two-hour evening slot → 2000 at the 1000/h rate
    let court2 = s.engine.create_court(s.venue.id, s.sport.id, 2).await.unwrap();
    let long_slot = s.engine.create_slot(court2.id, t(19), t(21)).await.unwrap();

    let a = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    let b = s
        .engine
        .create_reservation(long_slot.id, d(2024, 6, 15), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(a.id, 300).await.unwrap();
    s.engine.confirm_reservation(b.id, 600).await.unwrap();

    let periods = s
        .engine
        .revenue_by_period(d(2024, 6, 1), d(2024, 6, 30), Granularity::Month, None, None)
        .await
        .unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].period, "2024-06");
    assert_eq!(periods[0].reservation_count, 2);
    assert_eq!(periods[0].total_revenue, 3000);
    assert_eq!(periods[0].total_deposits, 900);
}

#[tokio::test]
async fn revenue_counts_only_confirmed_and_finalized() {
    let s = seeded("rev_states.wal").await;

    let pending = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    let _ = pending; // stays pending — excluded

    let cancelled = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 2), s.client.id, None)
        .await
        .unwrap();
    s.engine.cancel_reservation(cancelled.id, "no-show").await.unwrap();

    let finalized = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 3), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(finalized.id, 300).await.unwrap();
    s.engine.finalize_reservation(finalized.id).await.unwrap();

    let periods = s
        .engine
        .revenue_by_period(d(2024, 6, 1), d(2024, 6, 30), Granularity::Month, None, None)
        .await
        .unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].reservation_count, 1);
    assert_eq!(periods[0].total_revenue, 1000);
}

#[tokio::test]
async fn revenue_by_period_partitions_the_range() {
    let s = seeded("rev_partition.wal").await;
    for (day, deposit) in [(1, 300), (2, 1000), (15, 300), (28, 500)] {
        let r = s
            .engine
            .create_reservation(s.slot.id, d(2024, 6, day), s.client.id, None)
            .await
            .unwrap();
        s.engine.confirm_reservation(r.id, deposit).await.unwrap();
    }

    let from = d(2024, 6, 1);
    let to = d(2024, 6, 30);
    let by_day = s
        .engine
        .revenue_by_period(from, to, Granularity::Day, None, None)
        .await
        .unwrap();
    let by_week = s
        .engine
        .revenue_by_period(from, to, Granularity::Week, None, None)
        .await
        .unwrap();
    let by_month = s
        .engine
        .revenue_by_period(from, to, Granularity::Month, None, None)
        .await
        .unwrap();

    // Summing any granularity over the range yields the same totals —
    // no double counting, no omission.
    for periods in [&by_day, &by_week, &by_month] {
        assert_eq!(periods.iter().map(|p| p.reservation_count).sum::<u64>(), 4);
        assert_eq!(periods.iter().map(|p| p.total_revenue).sum::<i64>(), 4000);
        assert_eq!(periods.iter().map(|p| p.total_deposits).sum::<i64>(), 2100);
    }
    assert_eq!(by_day.len(), 4);
    assert_eq!(by_month.len(), 1);

    // Periods come back ascending
    let labels: Vec<_> = by_day.iter().map(|p| p.period.clone()).collect();
    let mut sorted = labels.clone();
    sorted.sort();
    assert_eq!(labels, sorted);
}

#[tokio::test]
async fn revenue_grouped_by_sport_and_venue() {
    let s = seeded("rev_groups.wal").await;
    let tennis = s.engine.create_sport("tenis").await.unwrap();
    s.engine.set_rate(tennis.id, TimeBand::OffPeak, 3000).await.unwrap();
    let tennis_court = s.engine.create_court(s.venue.id, tennis.id, 2).await.unwrap();
    let tennis_slot = s.engine.create_slot(tennis_court.id, t(18), t(19)).await.unwrap();

    let padel = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    let tenis = s
        .engine
        .create_reservation(tennis_slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(padel.id, 300).await.unwrap();
    s.engine.confirm_reservation(tenis.id, 900).await.unwrap();

    let by_sport = s
        .engine
        .revenue_by_sport(d(2024, 6, 1), d(2024, 6, 30), None)
        .await
        .unwrap();
    assert_eq!(by_sport.len(), 2);
    // Descending by revenue: tennis (3000) before padel (1000)
    assert_eq!(by_sport[0].id, tennis.id);
    assert_eq!(by_sport[0].name, "tenis");
    assert_eq!(by_sport[0].total_revenue, 3000);
    assert_eq!(by_sport[1].total_revenue, 1000);

    let by_venue = s
        .engine
        .revenue_by_venue(d(2024, 6, 1), d(2024, 6, 30), None)
        .await
        .unwrap();
    assert_eq!(by_venue.len(), 1);
    assert_eq!(by_venue[0].id, s.venue.id);
    assert_eq!(by_venue[0].name, "Club Centro");
    assert_eq!(by_venue[0].reservation_count, 2);
    assert_eq!(by_venue[0].total_revenue, 4000);

    // Sport filter narrows the venue report
    let padel_only = s
        .engine
        .revenue_by_venue(d(2024, 6, 1), d(2024, 6, 30), Some(s.sport.id))
        .await
        .unwrap();
    assert_eq!(padel_only[0].total_revenue, 1000);
}

#[tokio::test]
async fn occupancy_by_court_percentages_and_summary() {
    let s = seeded("occupancy.wal").await;
    // An empty court: no slots → zero available, zero percent, no division
    let empty_court = s.engine.create_court(s.venue.id, s.sport.id, 2).await.unwrap();

    // 3 of 10 days booked on the seeded court
    for day in [1, 2, 3] {
        let r = s
            .engine
            .create_reservation(s.slot.id, d(2024, 6, day), s.client.id, None)
            .await
            .unwrap();
        s.engine.confirm_reservation(r.id, 300).await.unwrap();
    }

    let report = s
        .engine
        .occupancy_by_court(d(2024, 6, 1), d(2024, 6, 10), Some(s.venue.id))
        .await
        .unwrap();
    assert_eq!(report.courts.len(), 2);

    let busy = &report.courts[0];
    assert_eq!(busy.court_id, s.court.id);
    assert_eq!(busy.slots_available, 10);
    assert_eq!(busy.slots_occupied, 3);
    assert_eq!(busy.occupancy_percent, 30.0);

    let idle = &report.courts[1];
    assert_eq!(idle.court_id, empty_court.id);
    assert_eq!(idle.slots_available, 0);
    assert_eq!(idle.occupancy_percent, 0.0);

    // Summaries: descending top, ascending bottom
    assert_eq!(report.top[0].court_id, s.court.id);
    assert_eq!(report.bottom[0].court_id, empty_court.id);

    // Occupancy shares the availability range cap
    assert!(matches!(
        s.engine
            .occupancy_by_court(d(2024, 1, 1), d(2024, 12, 31), None)
            .await,
        Err(EngineError::InvalidRange(_))
    ));
}

#[tokio::test]
async fn occupancy_counts_pending_holds_and_ignores_cancelled() {
    let s = seeded("occupancy_states.wal").await;

    // Pending occupies its pair
    s.engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    // Cancelled does not
    let gone = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 2), s.client.id, None)
        .await
        .unwrap();
    s.engine.cancel_reservation(gone.id, "no-show").await.unwrap();

    let report = s
        .engine
        .occupancy_by_court(d(2024, 6, 1), d(2024, 6, 2), None)
        .await
        .unwrap();
    assert_eq!(report.courts[0].slots_occupied, 1);
    assert_eq!(report.courts[0].slots_available, 2);
    assert_eq!(report.courts[0].occupancy_percent, 50.0);
}

#[tokio::test]
async fn top_clients_ranking() {
    let s = seeded("top_clients.wal").await;
    let frequent = s.client.id;
    let casual = s
        .engine
        .register_client("Carla", "Pérez", "555-0103", "carla@example.com")
        .await
        .unwrap();
    let slot2 = s.engine.create_slot(s.court.id, t(19), t(20)).await.unwrap();

    for (slot, day, client) in [
        (s.slot.id, 1, frequent),
        (slot2.id, 1, frequent),
        (s.slot.id, 8, casual.id),
    ] {
        let r = s
            .engine
            .create_reservation(slot, d(2024, 6, day), client, None)
            .await
            .unwrap();
        s.engine.confirm_reservation(r.id, 300).await.unwrap();
    }
    // A pending booking never counts toward activity
    s.engine
        .create_reservation(slot2.id, d(2024, 6, 8), casual.id, None)
        .await
        .unwrap();

    let ranking = s
        .engine
        .top_clients(d(2024, 6, 1), d(2024, 6, 30), None)
        .await
        .unwrap();
    assert_eq!(ranking.len(), 2);

    assert_eq!(ranking[0].client_id, frequent);
    assert_eq!(ranking[0].reservation_count, 2);
    assert_eq!(ranking[0].total_spend, 2000);
    assert_eq!(ranking[0].avg_spend, 1000);
    assert_eq!(ranking[0].first_reservation, d(2024, 6, 1));
    assert_eq!(ranking[0].last_reservation, d(2024, 6, 1));

    assert_eq!(ranking[1].client_id, casual.id);
    assert_eq!(ranking[1].reservation_count, 1);

    let capped = s
        .engine
        .top_clients(d(2024, 6, 1), d(2024, 6, 30), Some(1))
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].client_id, frequent);
}

#[tokio::test]
async fn report_records_serialize_for_presentation() {
    let s = seeded("report_serde.wal").await;
    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();
    s.engine.confirm_reservation(r.id, 300).await.unwrap();

    let periods = s
        .engine
        .revenue_by_period(d(2024, 6, 1), d(2024, 6, 30), Granularity::Month, None, None)
        .await
        .unwrap();
    let json = serde_json::to_value(&periods).unwrap();
    assert_eq!(json[0]["period"], "2024-06");
    assert_eq!(json[0]["total_revenue"], 1000);

    let grid = s
        .engine
        .availability(s.venue.id, None, d(2024, 6, 1), d(2024, 6, 1))
        .await
        .unwrap();
    let json = serde_json::to_value(&grid).unwrap();
    assert_eq!(json[0]["date"], "2024-06-01");
}

// ── Notifications ────────────────────────────────────────

#[tokio::test]
async fn lifecycle_events_reach_venue_subscribers() {
    let s = seeded("notify_lifecycle.wal").await;
    let mut rx = s.engine.notify.subscribe(s.venue.id);

    let r = s
        .engine
        .create_reservation(s.slot.id, d(2024, 6, 1), s.client.id, None)
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        Event::ReservationCreated { id, slot_id, .. } => {
            assert_eq!(id, r.id);
            assert_eq!(slot_id, s.slot.id);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
