//! Heartbeat liveness registry service.
//!
//! Tracks per-key heartbeat signals over HTTP and alerts when a key
//! goes silent past its deadline. Reads configuration from a TOML file
//! (~/.config/heartbeat-service/config.toml).

use axum::routing::get;
use tracing::{error, info, warn};

use heartbeat::config::{default_config_path, AppConfig};
use heartbeat::events::{create_event_bus, Event};
use heartbeat::interfaces::http::create_router;
use heartbeat::registry::sweeper::start_sweeper;
use heartbeat::registry::HeartbeatRegistry;
use heartbeat::support::errors::{AppError, ConfigError};
use heartbeat::support::shutdown::ShutdownCoordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("HEARTBEAT_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
                )
                .init();
            info!("Configuration loaded from {}", config_path.display());
            config
        }
        Err(e @ ConfigError::Read { .. }) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            warn!("Failed to read config: {}. Using defaults.", e);
            AppConfig::default()
        }
        // a config file that exists but does not parse or validate is
        // fatal: abort startup rather than run with silently-wrong values
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Invalid configuration in {}: {}", config_path.display(), e);
            return Err(AppError::Config(e).into());
        }
    };

    info!("Starting heartbeat liveness registry...");

    // ── Prometheus metrics recorder (must be installed before any metrics calls) ──
    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    info!("📊 Prometheus metrics recorder installed");

    // ── Core components ────────────────────────────────────────
    let coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.signal();
    let events = create_event_bus();

    // Log-only alert subscriber; real alert routing (email, SMS,
    // paging) hangs off the same bus.
    let mut alerts = events.subscribe();
    tokio::spawn(async move {
        while let Some(msg) = alerts.recv().await {
            match &msg.event {
                Event::MissedHeartbeat(e) => {
                    warn!(key = %e.key, expired_at = %e.expired_at, "💔 Missed heartbeat");
                }
                Event::StaleEntryReclaimed(e) => {
                    warn!(key = %e.key, last_seen = %e.last_seen, "🧹 Stale entry reclaimed");
                }
            }
        }
    });

    let registry = HeartbeatRegistry::shared(
        config.monitor.deadline(),
        events.clone(),
        coordinator.gauge(),
        shutdown.clone(),
    );
    let sweeper = start_sweeper(
        registry.clone(),
        shutdown.clone(),
        config.monitor.sweep_interval(),
    );

    // ── HTTP server ────────────────────────────────────────────
    let app = create_router(registry.clone()).route(
        "/metrics",
        get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(
        deadline_secs = config.monitor.deadline_secs,
        sweep_interval_secs = config.monitor.sweep_interval_secs,
        "🚀 Listening on {}",
        addr
    );

    coordinator.start_signal_listener();

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_shutdown.notified().wait().await;
        })
        .await?;

    // ── Drain: wait out the sweeper and in-flight notifications ──
    coordinator.drain_complete().await;
    let _ = sweeper.await;

    info!("👋 Shutdown complete");
    Ok(())
}
