//! Prometheus-kompatible Metriken fuer Pulse
//!
//! Registrierte Metriken:
//! - `pulse_connected_clients` – Gauge: Aktuell zugelassene Verbindungen
//! - `pulse_frames_relayed_total` – Counter: Weitergeleitete Frames (typ)
//! - `pulse_presence_broadcasts_total` – Counter: Verteilte Presence-Frames
//! - `pulse_admissions_total` – Counter: Zugelassene Identitaets-Ansprueche
//! - `pulse_evictions_total` – Counter: Verdraengte oder entfernte Verbindungen
//! - `pulse_auth_failures_total` – Counter: Abgelehnte Anmeldungen

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Pulse-Prometheus-Metriken
#[derive(Clone)]
pub struct PulseMetrics {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGauge,
    pub frames_relayed_total: IntCounterVec,
    pub presence_broadcasts_total: IntCounter,
    pub admissions_total: IntCounter,
    pub evictions_total: IntCounter,
    pub auth_failures_total: IntCounter,
}

impl PulseMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "pulse_connected_clients",
            "Anzahl aktuell zugelassener Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let frames_relayed_total = IntCounterVec::new(
            Opts::new(
                "pulse_frames_relayed_total",
                "Gesamtanzahl weitergeleiteter Frames",
            ),
            &["typ"],
        )?;
        registry.register(Box::new(frames_relayed_total.clone()))?;

        let presence_broadcasts_total = IntCounter::with_opts(Opts::new(
            "pulse_presence_broadcasts_total",
            "Gesamtanzahl zugestellter Presence-Frames",
        ))?;
        registry.register(Box::new(presence_broadcasts_total.clone()))?;

        let admissions_total = IntCounter::with_opts(Opts::new(
            "pulse_admissions_total",
            "Gesamtanzahl zugelassener Identitaets-Ansprueche",
        ))?;
        registry.register(Box::new(admissions_total.clone()))?;

        let evictions_total = IntCounter::with_opts(Opts::new(
            "pulse_evictions_total",
            "Gesamtanzahl verdraengter Verbindungen",
        ))?;
        registry.register(Box::new(evictions_total.clone()))?;

        let auth_failures_total = IntCounter::with_opts(Opts::new(
            "pulse_auth_failures_total",
            "Gesamtanzahl abgelehnter Anmeldungen",
        ))?;
        registry.register(Box::new(auth_failures_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            frames_relayed_total,
            presence_broadcasts_total,
            admissions_total,
            evictions_total,
            auth_failures_total,
        })
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
pub fn metrics_router(metriken: PulseMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<PulseMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
