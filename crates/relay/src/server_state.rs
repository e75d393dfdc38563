//! Gemeinsamer Zustand des Relays
//!
//! Haelt Konfiguration, Registry und Metrik-Beobachter als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use pulse_protocol::DEFAULT_MAX_FRAME_SIZE;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::{KeineMetriken, RelayMetrics};
use crate::registry::{ConnectionRegistry, DEFAULT_MAX_CLIENTS};

/// Konfiguration fuer das Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Frist fuer den Identitaets-Anspruch nach dem Verbindungsaufbau
    pub auth_timeout: Duration,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Anzahl gleichzeitig zugelassener Identitaeten
    pub max_clients: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Erlaubte Auth-Tokens; leer bedeutet keine Token-Pruefung
    pub auth_tokens: Vec<String>,
    /// Abstand der Keepalive-Pings an zugelassene Verbindungen
    pub keepalive: Duration,
    /// Ohne eingehenden Frame in dieser Zeit gilt die Verbindung als tot
    pub verbindungs_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(10),
            send_queue_groesse: 64,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            auth_tokens: Vec::new(),
            keepalive: Duration::from_secs(30),
            verbindungs_timeout: Duration::from_secs(90),
        }
    }
}

impl RelayConfig {
    /// Prueft ein mitgesendetes Auth-Token gegen die Konfiguration
    pub fn token_erlaubt(&self, token: Option<&str>) -> bool {
        if self.auth_tokens.is_empty() {
            return true;
        }
        token.is_some_and(|t| self.auth_tokens.iter().any(|erlaubt| erlaubt == t))
    }
}

/// Gemeinsamer Relay-Zustand (Arc-geteilt)
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub registry: ConnectionRegistry,
    pub metrics: Arc<dyn RelayMetrics>,
}

impl RelayState {
    pub fn neu(config: RelayConfig) -> Arc<Self> {
        Self::mit_metriken(config, Arc::new(KeineMetriken))
    }

    pub fn mit_metriken(config: RelayConfig, metrics: Arc<dyn RelayMetrics>) -> Arc<Self> {
        let registry = ConnectionRegistry::neu(config.max_clients, Arc::clone(&metrics));
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            metrics,
        })
    }
}
