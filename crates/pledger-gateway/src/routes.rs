//! Route handlers for the trigger and audit endpoints.
//!
//! Per-recipient failures never surface here — they live in the delivery
//! log. Only a fatal tick (configuration load failure) produces a non-2xx
//! response.

use std::sync::Arc;

use axum::{Json, extract::Query, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use super::server::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "pledger",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// The hourly trigger. Conceptually a POST with an empty body; the tick
/// instant is the server's current UTC time.
pub async fn run_tick(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    match state.coordinator.run_tick(now).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "processed": report.processed(),
                "summary": report.summary(),
                "attempted": report.attempted,
                "sent": report.sent,
                "skipped_duplicate": report.skipped_duplicate,
                "failed": report.failed,
            })),
        ),
        Err(e) => {
            tracing::error!("❌ Tick failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"ok": false, "error": e.to_string()})),
            )
        }
    }
}

/// The companion sweep trigger — marks overdue open commitments missed.
pub async fn run_sweep(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    match state.sweep.sweep_missed(now) {
        Ok(transitioned) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "processed": transitioned.len(),
                "summary": format!("{} commitment(s) marked missed", transitioned.len()),
                "transitioned": transitioned,
            })),
        ),
        Err(e) => {
            tracing::error!("❌ Sweep failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"ok": false, "error": e.to_string()})),
            )
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct DeliveriesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Recent delivery records, newest first — the admin's view of what went
/// out and what failed.
pub async fn recent_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeliveriesQuery>,
) -> impl IntoResponse {
    match state.ledger.recent(query.limit.min(500)) {
        Ok(records) => (StatusCode::OK, Json(serde_json::json!({ "deliveries": records }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"ok": false, "error": e.to_string()})),
        ),
    }
}
