use axum::{response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tinytodo_server::config::Config;
use tinytodo_server::{AppState, ChangeNotificationHub, app_router};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Update gauge metrics for sessions and observers (called periodically)
fn update_gauge_metrics(state: &AppState) {
    let (sessions, observers) = state.get_stats();
    metrics::gauge!("tinytodo_sessions_active").set(sessions as f64);
    metrics::gauge!("tinytodo_observers_active").set(observers as f64);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tinytodo=debug,tinytodo_server=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}, session_ttl={:?}",
        config.host, config.port, config.session.ttl
    );
    if !config.session.secret_from_env {
        warn!(
            "SESSION_SECRET not set - using a random secret, sessions will not survive a restart"
        );
    }
    if !config.demo.accounts.is_empty() {
        info!("Seeding {} demo accounts", config.demo.accounts.len());
    }

    let app_state = AppState::from_config(&config);

    // Periodic cleanup for expired sessions and self-service accounts
    let cleanup_state = app_state.clone();
    let sweep_interval = config.session.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            cleanup_state.sessions.cleanup_expired();
            let purged = cleanup_state.accounts.purge_expired();
            if purged > 0 {
                info!("Purged {} expired accounts", purged);
            }
            update_gauge_metrics(&cleanup_state);
        }
    });

    let hub = app_state.hub.clone();
    let app = app_router(app_state).route("/metrics/prometheus", get(prometheus_metrics));

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("TinyToDo server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C, then end every observer stream so open connections can drain
async fn shutdown_signal(hub: Arc<ChangeNotificationHub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    let closed = hub.close_all();
    info!("Shutdown signal received, closed {} observers", closed);
}
