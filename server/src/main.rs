mod api;
mod config;
mod websocket;

use std::sync::Arc;

use axum::Router;
use massa_loadcell::{open_scale, WeighingSystem};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Shared application state
pub struct AppState {
    pub scale: Arc<dyn WeighingSystem>,
    pub config: Config,
    /// Serialized weight messages for every connected stream
    pub weight_broadcast: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(scale: Arc<dyn WeighingSystem>, config: Config) -> Self {
        let (weight_broadcast, _) = broadcast::channel(100);
        Self {
            scale,
            config,
            weight_broadcast,
        }
    }
}

/// Build the application router
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api::router())
        .nest("/ws", websocket::router())
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "massa_server=debug,massa_loadcell=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Claim the load cell; a missing chip leaves it unavailable, not fatal
    let scale = open_scale(&config.scale);

    if config.tare_on_start {
        let samples = config.scale.acquisition.tare_samples;
        let startup_scale = Arc::clone(&scale);
        match tokio::task::spawn_blocking(move || startup_scale.tare(samples)).await? {
            Ok(zero_offset) => tracing::info!(zero_offset, "startup tare complete"),
            Err(err) => tracing::warn!(error = %err, "startup tare skipped"),
        }
    }

    let state = Arc::new(AppState::new(Arc::clone(&scale), config.clone()));

    // One sampler feeds every weight stream client
    let sampler = tokio::spawn(websocket::run_weight_sampler(state.clone()));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("massa server listening on {}", config.bind_address);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sampler.abort();
    tokio::task::spawn_blocking(move || scale.shutdown()).await??;
    tracing::info!("load cell powered down");

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
