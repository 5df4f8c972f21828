pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderValue, Method},
    routing::get,
};
use once_cell::sync::Lazy;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use api::{dlhd_controller::DlhdController, health_controller::health_endpoint};
use services::edge_services::EdgeServices;

/// where the dlhd routes are mounted, rewritten key uris hang off this
pub const API_PREFIX: &str = "/api/v1/dlhd";

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    pub async fn serve(config: Arc<AppConfig>) -> anyhow::Result<()> {
        Lazy::force(&STARTED_AT);

        let services = EdgeServices::new(config.clone())?;
        let app = Self::router(services, &config.cors_origin);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!("routes initialized, listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("error while starting server")?;

        Ok(())
    }

    /// full router with layers, split out so tests can drive it without a socket
    pub fn router(services: EdgeServices, cors_origin: &str) -> Router {
        Router::new()
            .nest(API_PREFIX, DlhdController::app())
            .route("/health", get(health_endpoint))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(cors_origin))
                    .layer(Extension(services)),
            )
    }
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if cors_origin.trim() == "*" {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("ignoring invalid cors origin {}", o);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => warn!("failed to listen for shutdown signal: {}", e),
    }
}
