pub mod auth;
pub mod handlers;
pub mod state;
pub mod url_validation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use state::AppState;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::Config;

/// Assembles the full route tree against a built [`AppState`]. Split out
/// from [`start`] so integration tests can drive the router directly
/// without binding a real listener.
pub fn build_router(state: AppState, prometheus_handle: metrics_exporter_prometheus::PrometheusHandle) -> Router {
    // CORS is always permissive: playlists and segments are fetched by HLS
    // players (hls.js, AVPlayer, ExoPlayer) running on arbitrary origins.
    // The bearer-auth middleware below is the actual access control.
    let cors = CorsLayer::very_permissive();

    let viewer_routes = Router::new()
        .route("/{org_slug}/{channel_slug}/{variant}.m3u8", get(handlers::playlist::serve_playlist))
        .route("/{org_slug}/{channel_slug}/cue", post(handlers::cue::trigger_cue))
        .route("/{org_slug}/{channel_slug}/{segment}", get(handlers::segment::serve_segment))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer_auth));

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route(
            "/metrics",
            get(move || handlers::metrics::serve_metrics(prometheus_handle.clone())),
        )
        .route("/demo/playlist.m3u8", get(handlers::demo::serve_demo_playlist))
        .merge(viewer_routes)
        .layer(cors)
        .with_state(state)
}

/// Start the Axum HTTP server.
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let base_url = config.base_url.clone();

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    info!("Prometheus metrics recorder installed");

    let state = AppState::new(config).await;

    // Periodic active-channel gauge refresh; the registry's own TTL reaper
    // handles actually evicting expired break state.
    let cleanup_coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            crate::metrics::set_active_channels(cleanup_coordinator.active_channel_count());
        }
    });

    info!("CORS: permissive mode (required for HLS player access)");
    let app = build_router(state, prometheus_handle);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind to {}: {}. Is port {} already in use?", addr, e, port);
            return Err(e.into());
        }
    };

    info!("server bound to {}", addr);
    info!("public URL: {}", base_url);
    info!("  health:  {}/health", base_url);
    info!("  metrics: {}/metrics", base_url);
    info!("  demo:    {}/demo/playlist.m3u8", base_url);

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!("server error: {}", e);
        return Err(e.into());
    }

    info!("server shut down gracefully");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
