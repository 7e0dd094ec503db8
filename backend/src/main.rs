//! TicketHub Backend Server
//!
//! Ticket marketplace API: vendor listings, seat reservation, the booking
//! lifecycle, advertisement slots and gateway payments.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use tickethub_server::clock::SystemClock;
use tickethub_server::config::{Config, StorageBackend};
use tickethub_server::db;
use tickethub_server::middleware::{rate_limit, RateLimiter, SecurityPolicy};
use tickethub_server::payment::{HttpGateway, PaymentGateway, SimulatedGateway};
use tickethub_server::routes::create_router;
use tickethub_server::state::{AppState, ServiceSettings};
use tickethub_server::store::{MemoryStore, PgStore, Store};

/// Idle rate limit buckets are dropped after this long
const RATE_LIMIT_IDLE: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        storage = ?config.storage,
        "Starting TicketHub server"
    );

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config).await?;
            db::run_migrations(&pool).await?;
            db::check_health(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.payment.secret_key {
        Some(secret_key) => Arc::new(
            HttpGateway::new(config.payment.gateway_url.clone(), secret_key.clone())
                .context("Failed to build payment gateway client")?,
        ),
        None => {
            tracing::warn!("PAYMENT_GATEWAY_SECRET_KEY not set, using simulated gateway");
            Arc::new(SimulatedGateway::auto_capture())
        }
    };

    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set, payment webhooks will be rejected");
    }

    let app_state = AppState::build(
        store,
        gateway,
        Arc::new(SystemClock),
        ServiceSettings::from_config(&config),
    );

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup(RATE_LIMIT_IDLE).await;
        }
    });

    let security = SecurityPolicy {
        hsts: config.environment.is_production(),
    };

    let app = create_router(app_state, security).layer(
        ServiceBuilder::new()
            .layer(configure_cors(config.cors_allowed_origins.as_deref()))
            .layer(from_fn_with_state(rate_limiter, rate_limit)),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
