use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::services::transport_services::TransportSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportHealth {
    #[serde(flatten)]
    pub snapshot: TransportSnapshot,
    pub env_proxy_configured: bool,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub transport: TransportHealth,
}
