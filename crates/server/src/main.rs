//! claimcheck API server
//!
//! HTTP front end for the fact-checking pipeline.
//! Handles:
//! - Request validation and size limits
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use claimcheck_common::{config::AppConfig, metrics, FactChecker};
use metrics_exporter_prometheus::PrometheusBuilder;
use middleware::{rate_limit_middleware, RequestLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub checker: Arc<FactChecker>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting claimcheck server v{}", claimcheck_common::VERSION);

    // Initialize metrics
    match metrics_listener(config.observability.metrics_port) {
        Some(metrics_addr) => {
            PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()?;
            metrics::register_metrics();
            info!(%metrics_addr, "Prometheus exporter listening");
        }
        None => info!("Metrics exporter disabled"),
    }

    // Assemble the pipeline
    let checker = FactChecker::from_config(&config).map_err(|e| {
        tracing::error!(error = %e, "Failed to assemble pipeline");
        e
    })?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState {
        config: Arc::new(config),
        checker: Arc::new(checker),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Prometheus listen address; port 0 disables the exporter
fn metrics_listener(port: u16) -> Option<SocketAddr> {
    (port != 0).then(|| SocketAddr::from(([0, 0, 0, 0], port)))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let limiter = RequestLimiter::new(
        state.config.server.requests_per_second,
        state.config.server.burst,
    );

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Pipeline routes (rate limited)
    let api_routes = Router::new()
        .route("/check", post(handlers::check::check))
        .route("/evidence", post(handlers::check::evidence))
        .route("/verify", post(handlers::check::verify))
        .route_layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.config.request_timeout()))
                .layer(cors),
        )
        .with_state(state)
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
