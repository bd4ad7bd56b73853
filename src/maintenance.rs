use std::sync::Arc;
use std::time::Duration;

use chrono::Days;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::observability;

/// How far back the occupancy sampler looks.
const SAMPLE_WINDOW_DAYS: u64 = 7;

/// Background task that rewrites the WAL once enough appends accumulate.
/// Compaction rewrites the log, never the state — reservations are only
/// ever mutated by caller-driven lifecycle operations.
pub async fn run_compactor(engine: Arc<Engine>) {
    let threshold = engine.config.compact_threshold;
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

/// Read-side stats sampler: refreshes occupancy gauges over a trailing
/// window. Pure derivation over the store — safe on any cadence.
pub async fn run_sampler(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        sample_once(&engine).await;
    }
}

async fn sample_once(engine: &Arc<Engine>) {
    let to = chrono::Utc::now().date_naive();
    let Some(from) = to.checked_sub_days(Days::new(SAMPLE_WINDOW_DAYS - 1)) else {
        return;
    };

    match engine.occupancy_by_court(from, to, None).await {
        Ok(report) => {
            let mut active: u64 = 0;
            for row in &report.courts {
                active += row.slots_occupied;
                metrics::gauge!(
                    observability::OCCUPANCY_PERCENT,
                    "court" => row.court_id.to_string()
                )
                .set(row.occupancy_percent);
            }
            metrics::gauge!(observability::RESERVATIONS_ACTIVE).set(active as f64);
        }
        Err(e) => debug!("occupancy sample skipped: {e}"),
    }
}
