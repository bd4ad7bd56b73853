use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use turnero::config::EngineConfig;
use turnero::engine::Engine;
use turnero::notify::NotifyHub;
use turnero::{maintenance, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("TURNERO_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    observability::init(metrics_port);

    let data_dir = std::env::var("TURNERO_DATA_DIR").unwrap_or_else(|_| "./data".into());
    std::fs::create_dir_all(&data_dir)?;

    let config = EngineConfig::from_env();
    let notify = Arc::new(NotifyHub::new());
    let wal_path = PathBuf::from(&data_dir).join("turnero.wal");
    let engine = Arc::new(Engine::new(wal_path, notify, config)?);

    info!("turnero engine up");
    info!("  data_dir: {data_dir}");
    info!(
        "  catalog: {} venues, {} slots, {} clients",
        engine.list_venues().len(),
        engine.slot_count(),
        engine.client_count(),
    );
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    tokio::spawn(maintenance::run_compactor(engine.clone()));
    tokio::spawn(maintenance::run_sampler(engine.clone()));

    // The engine has no listener of its own — it serves in-process callers
    // (route handlers, CLIs, test harnesses). Keep the process alive for
    // the maintenance tasks until a shutdown signal arrives.
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("turnero stopped");
    Ok(())
}
