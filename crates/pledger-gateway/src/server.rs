//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pledger_core::error::Result;
use pledger_scheduler::{DispatchCoordinator, DeliveryLedger, MissedSweep};

/// Shared state for the gateway server.
pub struct AppState {
    /// Runs one notification tick per trigger invocation.
    pub coordinator: DispatchCoordinator,
    /// Marks overdue open commitments as missed.
    pub sweep: MissedSweep,
    /// Delivery log handle for the audit endpoint.
    pub ledger: Arc<DeliveryLedger>,
    pub start_time: std::time::Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(super::routes::health_check))
        // External trigger endpoints — one POST per hour each.
        .route("/api/v1/tick", post(super::routes::run_tick))
        .route("/api/v1/sweep", post(super::routes::run_sweep))
        // Audit view of the delivery log.
        .route("/api/v1/deliveries", get(super::routes::recent_deliveries))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn start(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("🌐 Gateway listening on {host}:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pledger_scheduler::{LogTransport, PledgerDb};

    #[test]
    fn test_router_builds() {
        let db = Arc::new(PledgerDb::open_in_memory().unwrap());
        let ledger = Arc::new(DeliveryLedger::open_in_memory().unwrap());
        let state = Arc::new(AppState {
            coordinator: DispatchCoordinator::new(
                db.clone(),
                ledger.clone(),
                Arc::new(LogTransport),
                4,
            ),
            sweep: MissedSweep::new(db, ledger.clone(), "UTC"),
            ledger,
            start_time: std::time::Instant::now(),
        });
        let _router = build_router(state);
    }
}
