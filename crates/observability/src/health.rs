//! Health-Check-Endpunkt fuer Pulse
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl verbundener Clients

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Relay faehrt herunter und nimmt keine Verbindungen mehr an
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_clients: usize,
}

type ClientZaehler = dyn Fn() -> usize + Send + Sync;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    relay_aktiv: Arc<AtomicBool>,
    clients: Arc<ClientZaehler>,
}

impl HealthState {
    /// `clients` liefert die aktuelle Anzahl zugelassener Verbindungen
    pub fn neu<F>(clients: F) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        Self {
            start_time: Arc::new(Instant::now()),
            relay_aktiv: Arc::new(AtomicBool::new(true)),
            clients: Arc::new(clients),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn relay_aktiv(&self) -> bool {
        self.relay_aktiv.load(Ordering::Relaxed)
    }

    pub fn relay_status_setzen(&self, aktiv: bool) {
        self.relay_aktiv.store(aktiv, Ordering::Relaxed);
    }

    pub fn antwort(&self) -> HealthResponse {
        let status = if self.relay_aktiv() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            connected_clients: (self.clients)(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Relay-Status zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    // 200 auch bei degraded (Probe soll nicht failen)
    (StatusCode::OK, Json(state.antwort()))
}
