use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use crate::server::dtos::health_dto::{HealthResponse, HealthStatus, TransportHealth};
use crate::server::services::edge_services::EdgeServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint, nothing to ping so it just reports where the transport stands
///
/// degraded means the env proxy got burned and there's no pool to fall back on
pub async fn health_endpoint(
    Extension(services): Extension<EdgeServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let transport = services.transport.state().snapshot();
    let pool_size = services.transport.pool().len();
    let env_proxy_configured = services.config.proxy.is_some();

    let status = if transport.env_proxy_suppressed && pool_size == 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        transport: TransportHealth {
            snapshot: transport,
            env_proxy_configured,
            pool_size,
        },
    };

    (StatusCode::OK, Json(response))
}
