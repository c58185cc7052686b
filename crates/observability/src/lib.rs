//! # pforte-observability
//!
//! Observability-Crate fuer Pforte:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured JSON Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, PforteMetriken};
pub use middleware::request_timing_layer;

use anyhow::Result;
use std::net::SocketAddr;

/// Baut den Router mit `/metrics` und `/health`
pub fn observability_router(metriken: PforteMetriken, health: HealthState) -> axum::Router {
    axum::Router::new()
        .merge(metrics_router(metriken.clone()))
        .merge(health_router(health))
        .route_layer(axum::middleware::from_fn_with_state(
            metriken,
            middleware::timing_middleware,
        ))
        .layer(request_timing_layer())
}

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: PforteMetriken,
    health: HealthState,
) -> Result<()> {
    let app = observability_router(metriken, health);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app).await?;
    Ok(())
}
