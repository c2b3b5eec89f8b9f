/// Health check endpoint
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "pool": { "total": 4, "idle": 3 }
/// }
/// ```
///
/// A failed database check still answers 200, with `status: "degraded"`.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use kinship_shared::db::pool::{get_pool_stats, health_check as database_ping};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    pub version: String,

    pub database: String,

    pub pool: PoolSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub total: usize,

    pub idle: usize,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let connected = match database_ping(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    let stats = get_pool_stats(&state.db);

    Ok(Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        pool: PoolSnapshot {
            total: stats.total_connections,
            idle: stats.idle_connections,
        },
    }))
}
