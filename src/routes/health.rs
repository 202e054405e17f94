use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_latency_ms: Option<u64>,
    pub redis: &'static str,
}

fn label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// GET /health
///
/// Public. 503 only when the database is down.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_latency, redis_result) = tokio::join!(db::ping(&state.db), state.cache.health_check());
    let db_ok = db_latency.is_some();
    let redis_ok = redis_result.is_ok();

    // Redis only degrades service; without the database nothing works
    let (status, code) = match (db_ok, redis_ok) {
        (true, true) => ("healthy", StatusCode::OK),
        (true, false) => ("degraded", StatusCode::OK),
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            services: ServiceHealth {
                database: label(db_ok),
                database_latency_ms: db_latency.map(|d| d.as_millis() as u64),
                redis: label(redis_ok),
            },
        }),
    )
}
