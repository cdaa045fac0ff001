use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;
use utoipa::ToSchema;

use crate::handlers::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Degraded,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
}

/// Full health check response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub details: HealthDetails,
}

/// Tracks application start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

fn component<E: std::fmt::Display>(result: Result<(), E>, started: Instant) -> ComponentHealth {
    let latency_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => ComponentHealth {
            status: ComponentStatus::Up,
            message: "Connection successful".to_string(),
            latency_ms,
        },
        Err(e) => ComponentHealth {
            status: ComponentStatus::Down,
            message: format!("Connection failed: {}", e),
            latency_ms,
        },
    }
}

/// A database outage takes the service down, a cache outage degrades it.
fn overall(database: &ComponentHealth, cache: &ComponentHealth) -> ComponentStatus {
    match (database.status, cache.status) {
        (ComponentStatus::Up, ComponentStatus::Up) => ComponentStatus::Up,
        (ComponentStatus::Up, _) => ComponentStatus::Degraded,
        _ => ComponentStatus::Down,
    }
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service up or degraded", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_started = Instant::now();
    let database = component(crate::db::check_connection(&state.db).await, db_started);

    let cache_started = Instant::now();
    let cache = component(state.cache.ping().await, cache_started);

    let status = overall(&database, &cache);
    let code = match status {
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_secs: uptime_secs(),
            details: HealthDetails { database, cache },
        }),
    )
}

/// Liveness probe
pub async fn liveness_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(status: ComponentStatus) -> ComponentHealth {
        ComponentHealth {
            status,
            message: String::new(),
            latency_ms: 0,
        }
    }

    #[test]
    fn cache_outage_degrades_database_outage_downs() {
        use ComponentStatus::*;
        assert_eq!(overall(&health(Up), &health(Up)), Up);
        assert_eq!(overall(&health(Up), &health(Down)), Degraded);
        assert_eq!(overall(&health(Down), &health(Up)), Down);
    }
}
