//! Liveness and health handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    model: String,
    labels: usize,
    scans_total: u64,
    prediction_failures: u64,
    avg_inference_ms: f64,
}

/// Static liveness message
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: format!("{} API running", state.config.service_name),
    })
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.inference.stats();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        model: state.inference.model_name().to_string(),
        labels: state.inference.label_count(),
        scans_total: stats.scans_total,
        prediction_failures: stats.prediction_failures,
        avg_inference_ms: stats.avg_inference_ms,
    })
}
