mod availability;
mod catalog;
mod error;
mod pricing;
mod reports;
mod reservations;
#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use pricing::Quote;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

pub type SharedSlotBook = Arc<RwLock<SlotBook>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block on the first append, drain whatever else is already queued, then
/// fsync once for the whole batch and answer every waiting sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_control(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                control => {
                    deferred = Some(control);
                    break;
                }
            }
        }

        flush_batch(&mut wal, batch);
        if let Some(control) = deferred {
            handle_control(&mut wal, control);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let start = std::time::Instant::now();

    let mut result: io::Result<()> = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch — these callers are all told the batch failed.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(start.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are handled in the batch loop"),
    }
}

/// Send one event through the group-commit writer and wait for durability.
pub(super) async fn wal_append(
    tx: &mpsc::Sender<WalCommand>,
    event: &Event,
) -> Result<(), EngineError> {
    let (resp_tx, resp_rx) = oneshot::channel();
    tx.send(WalCommand::Append {
        event: event.clone(),
        response: resp_tx,
    })
    .await
    .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
    resp_rx
        .await
        .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}

/// Apply a lifecycle event to a slot ledger. No locking — the caller holds
/// the ledger's write guard (or is the sole owner during replay).
pub(super) fn apply_to_book(book: &mut SlotBook, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationCreated {
            id,
            slot_id,
            client_id,
            date,
            total,
            deposit_required,
            created_at,
        } => {
            book.insert(Reservation {
                id: *id,
                slot_id: *slot_id,
                client_id: *client_id,
                date: *date,
                state: ReservationState::Pending,
                total: *total,
                deposit_required: *deposit_required,
                deposit_paid: 0,
                cancel_reason: None,
                created_at: *created_at,
            });
            index.insert(*id, *slot_id);
        }
        Event::ReservationConfirmed {
            id, deposit_paid, ..
        } => {
            if let Some(r) = book.find_mut(id) {
                r.state = ReservationState::Confirmed;
                r.deposit_paid = *deposit_paid;
            }
        }
        Event::ReservationCancelled { id, reason, .. } => {
            if let Some(r) = book.find_mut(id) {
                r.state = ReservationState::Cancelled;
                r.cancel_reason = reason.clone();
            }
        }
        Event::ReservationFinalized { id, .. } => {
            if let Some(r) = book.find_mut(id) {
                r.state = ReservationState::Finalized;
            }
        }
        _ => {}
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub config: EngineConfig,
    pub notify: Arc<NotifyHub>,
    pub(crate) venues: DashMap<Ulid, Venue>,
    pub(crate) sports: DashMap<Ulid, Sport>,
    pub(crate) courts: DashMap<Ulid, Court>,
    pub(crate) slots: DashMap<Ulid, Slot>,
    pub(crate) clients: DashMap<Ulid, Client>,
    pub(crate) rates: DashMap<Ulid, RateCard>,
    /// One ledger per slot — the unit of write serialization.
    pub(crate) books: DashMap<Ulid, SharedSlotBook>,
    /// Reverse lookup: reservation id → slot id.
    pub(crate) reservation_slot: Arc<DashMap<Ulid, Ulid>>,
    /// Child indexes for O(1) catalog walks.
    pub(crate) courts_by_venue: DashMap<Ulid, Vec<Ulid>>,
    pub(crate) slots_by_court: DashMap<Ulid, Vec<Ulid>>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            config,
            notify,
            venues: DashMap::new(),
            sports: DashMap::new(),
            courts: DashMap::new(),
            slots: DashMap::new(),
            clients: DashMap::new(),
            rates: DashMap::new(),
            books: DashMap::new(),
            reservation_slot: Arc::new(DashMap::new()),
            courts_by_venue: DashMap::new(),
            slots_by_court: DashMap::new(),
            wal_tx,
        };

        // Replay — we are the sole owner of every ledger Arc here, so
        // try_write always succeeds instantly.
        for event in &events {
            match event.slot_id() {
                None => engine.apply_catalog(event),
                Some(slot_id) => {
                    if let Some(book) = engine.get_book(&slot_id) {
                        let mut guard = book.try_write().expect("replay: uncontended write");
                        apply_to_book(&mut guard, event, &engine.reservation_slot);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Apply a catalog event to the in-memory maps and indexes.
    pub(super) fn apply_catalog(&self, event: &Event) {
        match event {
            Event::VenueCreated { id, name, address } => {
                self.venues.insert(
                    *id,
                    Venue {
                        id: *id,
                        name: name.clone(),
                        address: address.clone(),
                        active: true,
                    },
                );
                self.courts_by_venue.entry(*id).or_default();
            }
            Event::VenueDeactivated { id } => {
                if let Some(mut v) = self.venues.get_mut(id) {
                    v.active = false;
                }
            }
            Event::SportCreated { id, name } => {
                self.sports.insert(
                    *id,
                    Sport {
                        id: *id,
                        name: name.clone(),
                    },
                );
            }
            Event::CourtCreated {
                id,
                venue_id,
                sport_id,
                number,
            } => {
                self.courts.insert(
                    *id,
                    Court {
                        id: *id,
                        venue_id: *venue_id,
                        sport_id: *sport_id,
                        number: *number,
                        active: true,
                    },
                );
                self.courts_by_venue.entry(*venue_id).or_default().push(*id);
                self.slots_by_court.entry(*id).or_default();
            }
            Event::CourtDeactivated { id } => {
                if let Some(mut c) = self.courts.get_mut(id) {
                    c.active = false;
                }
            }
            Event::SlotCreated {
                id,
                court_id,
                start,
                end,
            } => {
                self.slots.insert(
                    *id,
                    Slot {
                        id: *id,
                        court_id: *court_id,
                        start: *start,
                        end: *end,
                        active: true,
                    },
                );
                self.slots_by_court.entry(*court_id).or_default().push(*id);
                self.books
                    .insert(*id, Arc::new(RwLock::new(SlotBook::new(*id))));
            }
            Event::SlotDeactivated { id } => {
                if let Some(mut s) = self.slots.get_mut(id) {
                    s.active = false;
                }
            }
            Event::ClientRegistered {
                id,
                name,
                surname,
                phone,
                email,
                registered_at,
            } => {
                self.clients.insert(
                    *id,
                    Client {
                        id: *id,
                        name: name.clone(),
                        surname: surname.clone(),
                        phone: phone.clone(),
                        email: email.clone(),
                        registered_at: *registered_at,
                    },
                );
            }
            Event::RateSet {
                sport_id,
                band,
                rate_per_hour,
            } => {
                self.rates
                    .entry(*sport_id)
                    .or_default()
                    .set(*band, *rate_per_hour);
            }
            // Lifecycle events are routed to ledgers, not here.
            _ => {}
        }
    }

    pub(super) fn get_book(&self, slot_id: &Ulid) -> Option<SharedSlotBook> {
        self.books.get(slot_id).map(|e| e.value().clone())
    }

    /// Acquire a slot ledger's write guard, bounded by the operation
    /// timeout. A timeout here means nothing was written.
    pub(super) async fn lock_book_write(
        &self,
        slot_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<SlotBook>, EngineError> {
        let book = self
            .get_book(slot_id)
            .ok_or(EngineError::NotFound(*slot_id))?;
        tokio::time::timeout(self.config.op_timeout, book.write_owned())
            .await
            .map_err(|_| EngineError::Timeout)
    }

    /// Lookup reservation → slot, then take the slot's write guard.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<SlotBook>), EngineError> {
        let slot_id = self
            .reservation_slot
            .get(reservation_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let guard = self.lock_book_write(&slot_id).await?;
        Ok((slot_id, guard))
    }

    /// The venue a slot ultimately belongs to.
    pub(super) fn venue_of_slot(&self, slot_id: &Ulid) -> Result<Ulid, EngineError> {
        let court_id = self
            .slots
            .get(slot_id)
            .map(|s| s.court_id)
            .ok_or(EngineError::NotFound(*slot_id))?;
        self.courts
            .get(&court_id)
            .map(|c| c.venue_id)
            .ok_or(EngineError::NotFound(court_id))
    }

    /// WAL-append + apply + notify for a catalog event.
    pub(super) async fn commit_catalog_event(&self, event: Event) -> Result<(), EngineError> {
        wal_append(&self.wal_tx, &event).await?;
        self.apply_catalog(&event);
        if let Some(venue_id) = self.event_venue(&event) {
            self.notify.send(venue_id, &event);
        }
        Ok(())
    }

    /// Commit a lifecycle event on a detached task. The owned write guard
    /// moves into the task, so a caller dropping its future past the
    /// conflict check cannot leave the WAL and the ledger disagreeing —
    /// the commit always runs to success or a definitive failure.
    pub(super) async fn commit_on_task(
        &self,
        guard: OwnedRwLockWriteGuard<SlotBook>,
        venue_id: Ulid,
        event: Event,
    ) -> Result<(), EngineError> {
        let wal_tx = self.wal_tx.clone();
        let notify = self.notify.clone();
        let index = self.reservation_slot.clone();
        let task = tokio::spawn(async move {
            let mut guard = guard;
            wal_append(&wal_tx, &event).await?;
            apply_to_book(&mut guard, &event, &index);
            notify.send(venue_id, &event);
            Ok(())
        });
        task.await
            .map_err(|_| EngineError::WalError("commit task aborted".into()))?
    }

    fn event_venue(&self, event: &Event) -> Option<Ulid> {
        match event {
            Event::VenueCreated { id, .. } | Event::VenueDeactivated { id } => Some(*id),
            Event::CourtCreated { venue_id, .. } => Some(*venue_id),
            Event::CourtDeactivated { id } => self.courts.get(id).map(|c| c.venue_id),
            Event::SlotCreated { court_id, .. } => {
                self.courts.get(court_id).map(|c| c.venue_id)
            }
            Event::SlotDeactivated { id } => self.venue_of_slot(id).ok(),
            _ => None,
        }
    }

    /// Rewrite the WAL with the minimal event sequence that recreates the
    /// current state. Reservation history survives compaction — lifecycle
    /// events are re-emitted per reservation, because cancellation is a
    /// state, not a deletion.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for v in self.venues.iter() {
            events.push(Event::VenueCreated {
                id: v.id,
                name: v.name.clone(),
                address: v.address.clone(),
            });
            if !v.active {
                events.push(Event::VenueDeactivated { id: v.id });
            }
        }
        for s in self.sports.iter() {
            events.push(Event::SportCreated {
                id: s.id,
                name: s.name.clone(),
            });
        }
        for c in self.courts.iter() {
            events.push(Event::CourtCreated {
                id: c.id,
                venue_id: c.venue_id,
                sport_id: c.sport_id,
                number: c.number,
            });
            if !c.active {
                events.push(Event::CourtDeactivated { id: c.id });
            }
        }
        for s in self.slots.iter() {
            events.push(Event::SlotCreated {
                id: s.id,
                court_id: s.court_id,
                start: s.start,
                end: s.end,
            });
            if !s.active {
                events.push(Event::SlotDeactivated { id: s.id });
            }
        }
        for c in self.clients.iter() {
            events.push(Event::ClientRegistered {
                id: c.id,
                name: c.name.clone(),
                surname: c.surname.clone(),
                phone: c.phone.clone(),
                email: c.email.clone(),
                registered_at: c.registered_at,
            });
        }
        for entry in self.rates.iter() {
            let sport_id = *entry.key();
            if let Some(rate) = entry.off_peak {
                events.push(Event::RateSet {
                    sport_id,
                    band: TimeBand::OffPeak,
                    rate_per_hour: rate,
                });
            }
            if let Some(rate) = entry.peak {
                events.push(Event::RateSet {
                    sport_id,
                    band: TimeBand::Peak,
                    rate_per_hour: rate,
                });
            }
        }

        let book_arcs: Vec<SharedSlotBook> =
            self.books.iter().map(|e| e.value().clone()).collect();
        for book in book_arcs {
            let guard = book.read().await;
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    id: r.id,
                    slot_id: r.slot_id,
                    client_id: r.client_id,
                    date: r.date,
                    total: r.total,
                    deposit_required: r.deposit_required,
                    created_at: r.created_at,
                });
                if r.deposit_paid > 0 || r.state == ReservationState::Confirmed {
                    events.push(Event::ReservationConfirmed {
                        id: r.id,
                        slot_id: r.slot_id,
                        deposit_paid: r.deposit_paid,
                    });
                }
                match r.state {
                    ReservationState::Cancelled => events.push(Event::ReservationCancelled {
                        id: r.id,
                        slot_id: r.slot_id,
                        reason: r.cancel_reason.clone(),
                    }),
                    ReservationState::Finalized => events.push(Event::ReservationFinalized {
                        id: r.id,
                        slot_id: r.slot_id,
                    }),
                    _ => {}
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
