//! Health check endpoint for load balancers and monitoring.
//!
//! Returns 200 OK if the database is reachable, 503 Service Unavailable
//! otherwise.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use shared::api::{HealthResponse, SystemInfo};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/healthcheck", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.repos.status.ping().await {
        Ok(ok) => ok,
        Err(err) => {
            tracing::warn!("database health check failed: {err}");
            false
        }
    };

    let response = HealthResponse {
        status: if database { "available" } else { "unavailable" }.to_string(),
        database,
        system_info: SystemInfo {
            environment: state.config.env.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
