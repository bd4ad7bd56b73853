use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — used for record timestamps only. Calendar math
/// (booking dates, range expansion, period truncation) uses `NaiveDate`.
pub type Ms = i64;

/// Money in minor currency units.
pub type Money = i64;

// ── Catalog entities ─────────────────────────────────────────────

/// A physical facility location (sede).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sport {
    pub id: Ulid,
    pub name: String,
}

/// A playing surface (cancha). Belongs to exactly one venue and one sport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Court {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub sport_id: Ulid,
    pub number: u32,
    pub active: bool,
}

/// A recurring bookable interval on a court (turno). Carries no date of its
/// own — it is instantiated against a calendar date at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub id: Ulid,
    pub court_id: Ulid,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub active: bool,
}

impl Slot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// True when two templates on the same court would collide.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub email: String,
    pub registered_at: Ms,
}

/// Peak/off-peak pricing band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBand {
    Peak,
    OffPeak,
}

/// Hourly rates for one sport. The off-peak rate doubles as the default:
/// a peak lookup falls back to it when no dedicated peak rate is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateCard {
    pub off_peak: Option<Money>,
    pub peak: Option<Money>,
}

impl RateCard {
    pub fn rate_for(&self, band: TimeBand) -> Option<Money> {
        match band {
            TimeBand::Peak => self.peak.or(self.off_peak),
            TimeBand::OffPeak => self.off_peak,
        }
    }

    pub fn set(&mut self, band: TimeBand, rate: Money) {
        match band {
            TimeBand::Peak => self.peak = Some(rate),
            TimeBand::OffPeak => self.off_peak = Some(rate),
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

/// Lifecycle state. Transitions are monotonic: Pending → Confirmed →
/// Finalized, with Cancelled reachable from Pending or Confirmed.
/// Finalized and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationState {
    Pending,
    Confirmed,
    Finalized,
    Cancelled,
}

impl ReservationState {
    /// A non-cancelled reservation occupies its (slot, date) key.
    pub fn occupies(self) -> bool {
        self != ReservationState::Cancelled
    }

    /// States that count toward revenue figures.
    pub fn is_revenue(self) -> bool {
        matches!(self, ReservationState::Confirmed | ReservationState::Finalized)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationState::Finalized | ReservationState::Cancelled)
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReservationState::Pending => "pending",
            ReservationState::Confirmed => "confirmed",
            ReservationState::Finalized => "finalized",
            ReservationState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A booking of a slot for a specific calendar date. Never deleted —
/// cancellation is a state, preserving historical reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub state: ReservationState,
    pub total: Money,
    pub deposit_required: Money,
    pub deposit_paid: Money,
    pub cancel_reason: Option<String>,
    pub created_at: Ms,
}

/// Per-slot reservation ledger — the unit of locking. All reservations for
/// one slot, sorted by `date` (then creation order for cancelled history).
#[derive(Debug, Clone)]
pub struct SlotBook {
    pub slot_id: Ulid,
    pub reservations: Vec<Reservation>,
}

impl SlotBook {
    pub fn new(slot_id: Ulid) -> Self {
        Self {
            slot_id,
            reservations: Vec::new(),
        }
    }

    /// Insert keeping the ledger sorted by date.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.date <= reservation.date);
        self.reservations.insert(pos, reservation);
    }

    pub fn find(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| &r.id == id)
    }

    pub fn find_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| &r.id == id)
    }

    /// The reservation occupying `date`, if any. The uniqueness invariant
    /// guarantees at most one non-cancelled entry per date.
    pub fn active_on(&self, date: NaiveDate) -> Option<&Reservation> {
        self.in_range(date, date).find(|r| r.state.occupies())
    }

    /// All reservations dated within `[from, to]`, in date order.
    /// Binary search skips everything outside the window.
    pub fn in_range(&self, from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = &Reservation> {
        let lo = self.reservations.partition_point(|r| r.date < from);
        let hi = self.reservations.partition_point(|r| r.date <= to);
        self.reservations[lo..hi].iter()
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format.
/// Lifecycle events carry `slot_id` so replay can route them to the
/// owning ledger without consulting the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VenueCreated {
        id: Ulid,
        name: String,
        address: String,
    },
    VenueDeactivated {
        id: Ulid,
    },
    SportCreated {
        id: Ulid,
        name: String,
    },
    CourtCreated {
        id: Ulid,
        venue_id: Ulid,
        sport_id: Ulid,
        number: u32,
    },
    CourtDeactivated {
        id: Ulid,
    },
    SlotCreated {
        id: Ulid,
        court_id: Ulid,
        start: NaiveTime,
        end: NaiveTime,
    },
    SlotDeactivated {
        id: Ulid,
    },
    ClientRegistered {
        id: Ulid,
        name: String,
        surname: String,
        phone: String,
        email: String,
        registered_at: Ms,
    },
    RateSet {
        sport_id: Ulid,
        band: TimeBand,
        rate_per_hour: Money,
    },
    ReservationCreated {
        id: Ulid,
        slot_id: Ulid,
        client_id: Ulid,
        date: NaiveDate,
        total: Money,
        deposit_required: Money,
        created_at: Ms,
    },
    ReservationConfirmed {
        id: Ulid,
        slot_id: Ulid,
        deposit_paid: Money,
    },
    ReservationCancelled {
        id: Ulid,
        slot_id: Ulid,
        reason: Option<String>,
    },
    ReservationFinalized {
        id: Ulid,
        slot_id: Ulid,
    },
}

impl Event {
    /// The slot whose ledger this event mutates, for lifecycle events.
    pub fn slot_id(&self) -> Option<Ulid> {
        match self {
            Event::ReservationCreated { slot_id, .. }
            | Event::ReservationConfirmed { slot_id, .. }
            | Event::ReservationCancelled { slot_id, .. }
            | Event::ReservationFinalized { slot_id, .. } => Some(*slot_id),
            _ => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Availability status of one (slot, date) pair. A pending occupant is a
/// soft hold, so occupied pairs report the occupying reservation's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotStatus {
    Free,
    Occupied {
        reservation_id: Ulid,
        state: ReservationState,
    },
}

/// One row of an availability query: a slot instantiated on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotDay {
    pub slot_id: Ulid,
    pub court_id: Ulid,
    pub court_number: u32,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodRevenue {
    pub period: String,
    pub reservation_count: u64,
    pub total_revenue: Money,
    pub total_deposits: Money,
}

/// Revenue grouped by sport or venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRevenue {
    pub id: Ulid,
    pub name: String,
    pub reservation_count: u64,
    pub total_revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourtOccupancy {
    pub court_id: Ulid,
    pub venue_id: Ulid,
    pub court_number: u32,
    pub slots_available: u64,
    pub slots_occupied: u64,
    pub occupancy_percent: f64,
}

/// Per-court occupancy rows plus top/bottom-3 convenience summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyReport {
    pub courts: Vec<CourtOccupancy>,
    pub top: Vec<CourtOccupancy>,
    pub bottom: Vec<CourtOccupancy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientActivity {
    pub client_id: Ulid,
    pub name: String,
    pub surname: String,
    pub reservation_count: u64,
    pub total_spend: Money,
    pub avg_spend: Money,
    pub first_reservation: NaiveDate,
    pub last_reservation: NaiveDate,
}
