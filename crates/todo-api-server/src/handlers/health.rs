use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Settings;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    service: String,
    environment: String,
}

/// Liveness only; the remote store is not probed
pub async fn health_check(State(settings): State<Arc<Settings>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        service: settings.server.service_name.clone(),
        environment: settings.server.environment.clone(),
    })
}
