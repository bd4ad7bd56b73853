use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-venue broadcast hub. Availability displays subscribe to a venue and
/// receive every applied event that touches it (catalog changes and
/// reservation lifecycle moves alike).
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a venue's events. Creates the channel if needed.
    pub fn subscribe(&self, venue_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(venue_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event. No-op when nobody is listening on the venue.
    pub fn send(&self, venue_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&venue_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn subscriber_count(&self, venue_id: &Ulid) -> usize {
        self.channels
            .get(venue_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
