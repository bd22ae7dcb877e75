//! Twinchat server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twinchat_api::{AppState, app};
use twinchat_common::{Config, Region};
use twinchat_core::{ServiceRegistry, log_delivery};

/// How often expired verification codes are swept.
const PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Periodically drop expired verification codes in every live region.
fn spawn_code_purge(registry: Arc<ServiceRegistry>, regions: Vec<Region>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            for region in &regions {
                let purged = match registry.services(*region).await {
                    Ok(services) => services.verification.purge_expired().await,
                    Err(e) => Err(e),
                };
                match purged {
                    Ok(0) => {}
                    Ok(count) => info!(region = %region, count, "Purged expired verification codes"),
                    Err(e) => warn!(region = %region, error = %e, "Verification code purge failed"),
                }
            }
        }
    });
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "twinchat=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting twinchat server...");

    // Load configuration
    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    if config.backends.in_memory {
        warn!("Using in-memory backends; data will not survive a restart");
    }

    let registry = Arc::new(ServiceRegistry::new(config)?);

    // Connect every configured region up front so bad credentials fail fast
    let mut regions = Vec::new();
    for region in [Region::Global, Region::Cn] {
        if registry.backends().is_configured(region) {
            registry.services(region).await?;
            info!(region = %region, "Region backend ready");
            regions.push(region);
        } else {
            warn!(region = %region, "Region backend not configured");
        }
    }
    spawn_code_purge(Arc::clone(&registry), regions);

    let state = AppState::new(registry, log_delivery());

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api", app(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}
