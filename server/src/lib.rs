//! pulse-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Relay, Metriken und Health-Check zu einem
//! lauffaehigen Prozess.

pub mod config;
pub mod metriken;

use anyhow::{Context, Result};
use config::ServerConfig;
use metriken::PrometheusRelayMetrics;
use pulse_observability::{observability_server_starten, HealthState, PulseMetrics};
use pulse_relay::{RelayServer, RelayState};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.starten_bis(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht installiert werden");
            }
        })
        .await
    }

    /// Startet alle Subsysteme und laeuft bis `signal` abschliesst
    ///
    /// Reihenfolge:
    /// 1. Metriken registrieren
    /// 2. Relay-Listener binden
    /// 3. Observability-Server starten (falls aktiviert)
    /// 4. Auf das Shutdown-Signal warten, dann alle Verbindungen trennen
    pub async fn starten_bis<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let metriken = PulseMetrics::neu()?;
        let state = RelayState::mit_metriken(
            self.config.relay_config(),
            Arc::new(PrometheusRelayMetrics::neu(metriken.clone())),
        );

        let relay_addr = adresse_aufloesen(&self.config.relay_bind_adresse()).await?;
        let relay = RelayServer::binden(Arc::clone(&state), relay_addr)
            .await
            .with_context(|| format!("Relay-Listener auf {relay_addr} nicht verfuegbar"))?;

        tracing::info!(
            relay = %relay.local_addr()?,
            max_clients = self.config.relay.max_clients,
            auth_tokens = self.config.relay.auth_tokens.len(),
            "Server startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let health = {
            let state = Arc::clone(&state);
            HealthState::neu(move || state.registry.anzahl())
        };

        let observability = if self.config.observability.aktiviert {
            let addr = adresse_aufloesen(&self.config.observability_bind_adresse()).await?;
            Some(tokio::spawn(observability_server_starten(
                addr,
                metriken,
                health.clone(),
                shutdown_rx.clone(),
            )))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        let relay_task = tokio::spawn(relay.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal...");
        signal.await;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        health.relay_status_setzen(false);
        shutdown_tx.send_replace(true);

        relay_task.await??;
        if let Some(task) = observability {
            if let Err(e) = task.await? {
                tracing::warn!(fehler = %e, "Observability-Server mit Fehler beendet");
            }
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Loest eine `host:port`-Adresse auf (erste Adresse gewinnt)
async fn adresse_aufloesen(adresse: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(adresse)
        .await
        .with_context(|| format!("Adresse '{adresse}' nicht aufloesbar"))?
        .next()
        .with_context(|| format!("Adresse '{adresse}' liefert keine Ziele"))
}
