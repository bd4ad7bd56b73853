use chrono::NaiveTime;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::reservations::now_ms;
use super::{Engine, EngineError};

impl Engine {
    // ── Admin mutations ──────────────────────────────────────

    pub async fn create_venue(
        &self,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<Venue, EngineError> {
        let name = name.into();
        let address = address.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("venue name length"));
        }
        if address.len() > MAX_ADDRESS_LEN {
            return Err(EngineError::LimitExceeded("venue address too long"));
        }
        if self.venues.len() >= MAX_VENUES {
            return Err(EngineError::LimitExceeded("too many venues"));
        }

        let id = Ulid::new();
        self.commit_catalog_event(Event::VenueCreated {
            id,
            name: name.clone(),
            address: address.clone(),
        })
        .await?;
        Ok(Venue {
            id,
            name,
            address,
            active: true,
        })
    }

    /// Soft-deactivation: the venue stops offering availability but all
    /// history stays queryable.
    pub async fn deactivate_venue(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.venues.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.commit_catalog_event(Event::VenueDeactivated { id }).await
    }

    pub async fn create_sport(&self, name: impl Into<String>) -> Result<Sport, EngineError> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("sport name length"));
        }
        if self.sports.len() >= MAX_SPORTS {
            return Err(EngineError::LimitExceeded("too many sports"));
        }

        let id = Ulid::new();
        self.commit_catalog_event(Event::SportCreated {
            id,
            name: name.clone(),
        })
        .await?;
        Ok(Sport { id, name })
    }

    pub async fn create_court(
        &self,
        venue_id: Ulid,
        sport_id: Ulid,
        number: u32,
    ) -> Result<Court, EngineError> {
        if !self.venues.contains_key(&venue_id) {
            return Err(EngineError::NotFound(venue_id));
        }
        if !self.sports.contains_key(&sport_id) {
            return Err(EngineError::NotFound(sport_id));
        }
        if let Some(courts) = self.courts_by_venue.get(&venue_id)
            && courts.len() >= MAX_COURTS_PER_VENUE
        {
            return Err(EngineError::LimitExceeded("too many courts on venue"));
        }

        let id = Ulid::new();
        self.commit_catalog_event(Event::CourtCreated {
            id,
            venue_id,
            sport_id,
            number,
        })
        .await?;
        Ok(Court {
            id,
            venue_id,
            sport_id,
            number,
            active: true,
        })
    }

    pub async fn deactivate_court(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.courts.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.commit_catalog_event(Event::CourtDeactivated { id }).await
    }

    /// Register a bookable template on a court. Overlapping an existing
    /// active template on the same court is rejected — two slots may not
    /// offer the same minutes twice.
    pub async fn create_slot(
        &self,
        court_id: Ulid,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Slot, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidRange("slot start must precede end"));
        }
        if !self.courts.contains_key(&court_id) {
            return Err(EngineError::NotFound(court_id));
        }
        if let Some(slot_ids) = self.slots_by_court.get(&court_id) {
            if slot_ids.len() >= MAX_SLOTS_PER_COURT {
                return Err(EngineError::LimitExceeded("too many slots on court"));
            }
            for slot_id in slot_ids.iter() {
                if let Some(existing) = self.slots.get(slot_id)
                    && existing.active
                    && existing.overlaps(start, end)
                {
                    return Err(EngineError::SlotUnavailable(*slot_id));
                }
            }
        }

        let id = Ulid::new();
        self.commit_catalog_event(Event::SlotCreated {
            id,
            court_id,
            start,
            end,
        })
        .await?;
        Ok(Slot {
            id,
            court_id,
            start,
            end,
            active: true,
        })
    }

    /// Deactivate a template. Existing reservations on it stay visible as
    /// occupied; no new availability is offered.
    pub async fn deactivate_slot(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.slots.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.commit_catalog_event(Event::SlotDeactivated { id }).await
    }

    pub async fn register_client(
        &self,
        name: impl Into<String>,
        surname: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Client, EngineError> {
        let (name, surname) = (name.into(), surname.into());
        let (phone, email) = (phone.into(), email.into());
        if name.is_empty() || name.len() > MAX_NAME_LEN || surname.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("client name length"));
        }
        if self.clients.len() >= MAX_CLIENTS {
            return Err(EngineError::LimitExceeded("too many clients"));
        }

        let id = Ulid::new();
        let registered_at = now_ms();
        self.commit_catalog_event(Event::ClientRegistered {
            id,
            name: name.clone(),
            surname: surname.clone(),
            phone: phone.clone(),
            email: email.clone(),
            registered_at,
        })
        .await?;
        Ok(Client {
            id,
            name,
            surname,
            phone,
            email,
            registered_at,
        })
    }

    /// Set the hourly rate for a sport/band. The off-peak rate doubles as
    /// the default when no peak rate is configured.
    pub async fn set_rate(
        &self,
        sport_id: Ulid,
        band: TimeBand,
        rate_per_hour: Money,
    ) -> Result<(), EngineError> {
        if !self.sports.contains_key(&sport_id) {
            return Err(EngineError::NotFound(sport_id));
        }
        if rate_per_hour < 0 {
            return Err(EngineError::InvalidAmount("rate must be non-negative"));
        }
        self.commit_catalog_event(Event::RateSet {
            sport_id,
            band,
            rate_per_hour,
        })
        .await
    }

    // ── Catalog queries ──────────────────────────────────────

    /// Active slots on active courts of a venue, optionally restricted to
    /// one sport. Ordered by (court number, start time).
    pub fn list_slots(
        &self,
        venue_id: Ulid,
        sport_id: Option<Ulid>,
    ) -> Result<Vec<Slot>, EngineError> {
        if !self.venues.contains_key(&venue_id) {
            return Err(EngineError::NotFound(venue_id));
        }
        if let Some(sid) = sport_id
            && !self.sports.contains_key(&sid)
        {
            return Err(EngineError::NotFound(sid));
        }

        let mut out: Vec<(u32, Slot)> = Vec::new();
        for (court, slot) in self.venue_slots(venue_id, sport_id) {
            if slot.active {
                out.push((court.number, slot));
            }
        }
        out.sort_by(|a, b| (a.0, a.1.start).cmp(&(b.0, b.1.start)));
        Ok(out.into_iter().map(|(_, slot)| slot).collect())
    }

    pub fn list_venues(&self) -> Vec<Venue> {
        let mut venues: Vec<Venue> = self.venues.iter().map(|v| v.value().clone()).collect();
        venues.sort_by_key(|v| v.id);
        venues
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn get_court(&self, id: &Ulid) -> Result<Court, EngineError> {
        self.courts
            .get(id)
            .map(|c| c.value().clone())
            .ok_or(EngineError::NotFound(*id))
    }

    pub async fn get_reservation(&self, id: &Ulid) -> Result<Reservation, EngineError> {
        let slot_id = self
            .reservation_slot
            .get(id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*id))?;
        let book = self
            .get_book(&slot_id)
            .ok_or(EngineError::NotFound(slot_id))?;
        let guard = book.read().await;
        guard
            .find(id)
            .cloned()
            .ok_or(EngineError::NotFound(*id))
    }

    /// All (court, slot) pairs of an active venue on active courts,
    /// ignoring slot activity — callers filter. A deactivated venue offers
    /// nothing. Shared by listing and availability walks.
    pub(super) fn venue_slots(
        &self,
        venue_id: Ulid,
        sport_id: Option<Ulid>,
    ) -> Vec<(Court, Slot)> {
        if !self.venues.get(&venue_id).is_some_and(|v| v.active) {
            return Vec::new();
        }
        let Some(court_ids) = self.courts_by_venue.get(&venue_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for court_id in court_ids.iter() {
            let Some(court) = self.courts.get(court_id).map(|c| c.value().clone()) else {
                continue;
            };
            if !court.active {
                continue;
            }
            if let Some(sid) = sport_id
                && court.sport_id != sid
            {
                continue;
            }
            if let Some(slot_ids) = self.slots_by_court.get(court_id) {
                for slot_id in slot_ids.iter() {
                    if let Some(slot) = self.slots.get(slot_id) {
                        out.push((court.clone(), slot.value().clone()));
                    }
                }
            }
        }
        out
    }
}
