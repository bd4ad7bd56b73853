use chrono::{Datelike, NaiveDate, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::pricing::deposit_for;
use super::{Engine, EngineError};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn validate_date(date: NaiveDate) -> Result<(), EngineError> {
    if date.year() < MIN_RESERVATION_YEAR || date.year() > MAX_RESERVATION_YEAR {
        return Err(EngineError::LimitExceeded("reservation date out of range"));
    }
    Ok(())
}

impl Engine {
    /// Book a slot for a calendar date.
    ///
    /// The (slot, date) key is re-checked under the slot's write guard
    /// immediately before the commit — the availability read a caller did
    /// earlier is advisory only, so two racing requests for the same pair
    /// resolve to exactly one winner. On conflict nothing is written.
    ///
    /// `requested_price` lets the caller pin an agreed price: it must be
    /// non-negative and within the configured tolerance of the quote, and
    /// the deposit is re-derived from it.
    pub async fn create_reservation(
        &self,
        slot_id: Ulid,
        date: NaiveDate,
        client_id: Ulid,
        requested_price: Option<Money>,
    ) -> Result<Reservation, EngineError> {
        validate_date(date)?;
        let slot = self
            .slots
            .get(&slot_id)
            .map(|s| s.value().clone())
            .ok_or(EngineError::NotFound(slot_id))?;
        if !self.clients.contains_key(&client_id) {
            return Err(EngineError::NotFound(client_id));
        }
        let court = self.get_court(&slot.court_id)?;
        if !slot.active || !court.active {
            return Err(EngineError::SlotUnavailable(slot_id));
        }

        let quote = self.quote(slot.court_id, date, slot.start, slot.end)?;
        let (total, deposit_required) = match requested_price {
            None => (quote.total, quote.deposit_required),
            Some(price) => {
                if price < 0 {
                    return Err(EngineError::InvalidAmount("price must be non-negative"));
                }
                if (price - quote.total).abs() > self.config.price_tolerance {
                    return Err(EngineError::InvalidAmount("price outside quote tolerance"));
                }
                (price, deposit_for(price, &self.config))
            }
        };

        let venue_id = court.venue_id;
        let guard = self.lock_book_write(&slot_id).await?;

        // Authoritative conflict check, inside the lock.
        if let Some(existing) = guard.active_on(date) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotUnavailable(existing.id));
        }

        let reservation = Reservation {
            id: Ulid::new(),
            slot_id,
            client_id,
            date,
            state: ReservationState::Pending,
            total,
            deposit_required,
            deposit_paid: 0,
            cancel_reason: None,
            created_at: now_ms(),
        };
        let event = Event::ReservationCreated {
            id: reservation.id,
            slot_id,
            client_id,
            date,
            total,
            deposit_required,
            created_at: reservation.created_at,
        };
        self.commit_on_task(guard, venue_id, event).await?;
        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        Ok(reservation)
    }

    /// Record the deposit and move Pending → Confirmed.
    ///
    /// The stored deposit is clamped to the total: the tolerance admits a
    /// small overpayment at the door without ever persisting
    /// `deposit_paid > total`.
    pub async fn confirm_reservation(
        &self,
        reservation_id: Ulid,
        deposit_paid: Money,
    ) -> Result<Reservation, EngineError> {
        let (slot_id, guard) = self.resolve_reservation_write(&reservation_id).await?;
        let current = guard
            .find(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        if current.state != ReservationState::Pending {
            return Err(EngineError::InvalidTransition {
                from: current.state,
            });
        }
        if deposit_paid < 0 {
            return Err(EngineError::InvalidAmount("deposit must be non-negative"));
        }
        if deposit_paid > current.total + self.config.deposit_tolerance {
            return Err(EngineError::InvalidAmount("deposit exceeds total price"));
        }

        let stored = deposit_paid.min(current.total);
        let mut updated = current.clone();
        updated.state = ReservationState::Confirmed;
        updated.deposit_paid = stored;

        let venue_id = self.venue_of_slot(&slot_id)?;
        let event = Event::ReservationConfirmed {
            id: reservation_id,
            slot_id,
            deposit_paid: stored,
        };
        self.commit_on_task(guard, venue_id, event).await?;
        metrics::counter!(observability::RESERVATIONS_CONFIRMED_TOTAL).increment(1);
        Ok(updated)
    }

    /// Cancel from Pending or Confirmed, releasing the (slot, date) key.
    ///
    /// Idempotent: cancelling an already-cancelled reservation succeeds
    /// without writing — callers see cancellation as eventually consistent,
    /// so a repeat is not an error.
    pub async fn cancel_reservation(
        &self,
        reservation_id: Ulid,
        reason: &str,
    ) -> Result<Reservation, EngineError> {
        if reason.len() > MAX_CANCEL_REASON_LEN {
            return Err(EngineError::LimitExceeded("cancel reason too long"));
        }
        let (slot_id, guard) = self.resolve_reservation_write(&reservation_id).await?;
        let current = guard
            .find(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        match current.state {
            ReservationState::Cancelled => return Ok(current.clone()),
            ReservationState::Finalized => {
                return Err(EngineError::InvalidTransition {
                    from: current.state,
                });
            }
            ReservationState::Pending | ReservationState::Confirmed => {}
        }

        let mut updated = current.clone();
        updated.state = ReservationState::Cancelled;
        updated.cancel_reason = Some(reason.to_string());

        let venue_id = self.venue_of_slot(&slot_id)?;
        let event = Event::ReservationCancelled {
            id: reservation_id,
            slot_id,
            reason: updated.cancel_reason.clone(),
        };
        self.commit_on_task(guard, venue_id, event).await?;
        metrics::counter!(observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        Ok(updated)
    }

    /// Move Confirmed → Finalized once the service was rendered. Rejected
    /// with `TooEarly` while the reservation date is still in the future.
    pub async fn finalize_reservation(
        &self,
        reservation_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let (slot_id, guard) = self.resolve_reservation_write(&reservation_id).await?;
        let current = guard
            .find(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        if current.state != ReservationState::Confirmed {
            return Err(EngineError::InvalidTransition {
                from: current.state,
            });
        }
        if current.date > today() {
            return Err(EngineError::TooEarly { date: current.date });
        }

        let mut updated = current.clone();
        updated.state = ReservationState::Finalized;

        let venue_id = self.venue_of_slot(&slot_id)?;
        let event = Event::ReservationFinalized {
            id: reservation_id,
            slot_id,
        };
        self.commit_on_task(guard, venue_id, event).await?;
        metrics::counter!(observability::RESERVATIONS_FINALIZED_TOTAL).increment(1);
        Ok(updated)
    }
}
