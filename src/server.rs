use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, AppState},
    live::LiveFeed,
    logger::DataLogger,
    metrics,
    sampler::{run_sampler, SimulatedSensor},
    scheduler::{FlushScheduler, FlushTrigger},
    signals::setup_signal_handlers,
    store::LogStore,
};

/// Start the power logger server
///
/// This function:
/// 1. Initializes metrics
/// 2. Recovers the log file and restores the logging flag
/// 3. Starts the flush thread, signal handlers and the sampler
/// 4. Serves HTTP until a shutdown signal arrives
/// 5. Stops sampling and performs a final flush
pub async fn start_server(config: Config) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some(Arc::new(metrics::init_metrics()?))
    } else {
        None
    };

    if let Some(parent) = config.store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }

    let store = Arc::new(LogStore::new(&config.store));
    if !store.recover().await {
        tracing::warn!(
            path = %config.store.path.display(),
            "Log file is not accessible; logging stays off until it is reset"
        );
    }

    let trigger = FlushTrigger::new();
    let live = Arc::new(LiveFeed::new(config.live.ring_capacity, config.live.channel_capacity));
    let logger = Arc::new(DataLogger::new(
        store.clone(),
        live,
        trigger.clone(),
        config.sampler.state_file.clone(),
        config.sampler.logging_enabled_default,
        config.live.replay_stride,
    ));

    let scheduler = FlushScheduler::spawn(
        store.clone(),
        Duration::from_secs(config.scheduler.flush_interval_secs),
        trigger.clone(),
        tokio::runtime::Handle::current(),
    )
    .context("Failed to start the flush scheduler thread")?;

    // SIGTERM/SIGINT for shutdown, SIGHUP for a manual flush
    let (shutdown_tx, signal_handle) = setup_signal_handlers(trigger)?;
    let mut shutdown_rx = shutdown_tx.subscribe();

    let sampler = tokio::spawn(run_sampler(
        SimulatedSensor::new(),
        logger.clone(),
        Duration::from_millis(config.sampler.interval_ms),
        shutdown_tx.subscribe(),
    ));

    let state = AppState {
        logger,
        query: config.query.clone(),
        live: config.live.clone(),
        shutdown: shutdown_tx.clone(),
    };
    let metrics_route = metrics_handle.map(|handle| (config.metrics.endpoint.clone(), handle));
    let app = create_router(state, metrics_route);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting power logger on {}", addr);
    info!(
        path = %config.store.path.display(),
        queue_capacity = config.store.queue_capacity,
        flush_interval_secs = config.scheduler.flush_interval_secs,
        "Log store ready"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    if let Err(e) = sampler.await {
        tracing::error!("Sampler task failed: {}", e);
    }
    tokio::task::spawn_blocking(move || scheduler.shutdown()).await?;
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, metrics: Option<(String, Arc<PrometheusHandle>)>) -> Router {
    let app_routes = Router::new()
        .route("/data", get(handlers::data::handle_data))
        .route("/dataevents", get(handlers::events::handle_events))
        .route("/status", get(handlers::status::handle_status))
        .route("/control/logging", post(handlers::control::toggle_logging))
        .route("/control/flush", post(handlers::control::flush))
        .route("/control/reset", post(handlers::control::reset))
        .with_state(state);

    let mut router = Router::new()
        .route("/health", get(handlers::status::health_check))
        .route("/heap", get(handlers::status::handle_heap))
        .merge(app_routes);

    if let Some((endpoint, handle)) = metrics {
        router = router.merge(
            Router::new()
                .route(&endpoint, get(handlers::metrics_handler::metrics))
                .with_state(handle),
        );
    }

    router.layer(TraceLayer::new_for_http())
}
