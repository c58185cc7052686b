//! Prometheus-kompatible Metriken fuer Pforte
//!
//! Registrierte Metriken:
//! - `pforte_sessions_active` – Gauge: Aktive Sessions
//! - `pforte_users` – Gauge: Benutzer je Kontostatus (`status`)
//! - `pforte_tokens_cleaned_total` – Counter: Entfernte abgelaufene Verifizierungs-Tokens
//! - `pforte_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `pforte_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//!
//! Zusaetzlich die Prozess-Metriken des `prometheus`-Crates (CPU, Speicher, Dateideskriptoren).

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Pforte-Prometheus-Metriken
#[derive(Clone)]
pub struct PforteMetriken {
    pub registry: Arc<Registry>,

    // Zugangs-Metriken
    pub aktive_sessions: IntGauge,
    pub benutzer_nach_status: IntGaugeVec,
    pub tokens_bereinigt: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl PforteMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let aktive_sessions = IntGauge::with_opts(Opts::new(
            "pforte_sessions_active",
            "Anzahl aktiver Sessions",
        ))?;
        registry.register(Box::new(aktive_sessions.clone()))?;

        let benutzer_nach_status = IntGaugeVec::new(
            Opts::new("pforte_users", "Anzahl Benutzer je Kontostatus"),
            &["status"],
        )?;
        registry.register(Box::new(benutzer_nach_status.clone()))?;

        let tokens_bereinigt = IntCounter::with_opts(Opts::new(
            "pforte_tokens_cleaned_total",
            "Entfernte abgelaufene Verifizierungs-Tokens",
        ))?;
        registry.register(Box::new(tokens_bereinigt.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("pforte_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pforte_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            aktive_sessions,
            benutzer_nach_status,
            tokens_bereinigt,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Setzt die Benutzerzahlen je Status; fehlende Status werden auf 0 gesetzt
    pub fn benutzer_setzen<'a>(
        &self,
        alle_status: &[&str],
        zaehlung: impl IntoIterator<Item = (&'a str, i64)>,
    ) {
        for status in alle_status {
            self.benutzer_nach_status.with_label_values(&[*status]).set(0);
        }
        for (status, anzahl) in zaehlung {
            self.benutzer_nach_status
                .with_label_values(&[status])
                .set(anzahl);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: PforteMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<PforteMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
