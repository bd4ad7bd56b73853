use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "turnero_reservations_created_total";

/// Counter: bookings rejected because the (slot, date) key was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "turnero_booking_conflicts_total";

/// Counter: confirmations applied.
pub const RESERVATIONS_CONFIRMED_TOTAL: &str = "turnero_reservations_confirmed_total";

/// Counter: cancellations applied (idempotent repeats not counted).
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "turnero_reservations_cancelled_total";

/// Counter: finalizations applied.
pub const RESERVATIONS_FINALIZED_TOTAL: &str = "turnero_reservations_finalized_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: non-cancelled reservations currently in the store.
pub const RESERVATIONS_ACTIVE: &str = "turnero_reservations_active";

/// Gauge: per-court occupancy percent over the sampler window. Label: court.
pub const OCCUPANCY_PERCENT: &str = "turnero_occupancy_percent";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "turnero_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "turnero_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if `port` is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
