//! Pulse Relay-Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use pulse_server::config::{ServerConfig, ENV_CONFIG, ENV_SERVER_ADDR, STANDARD_CONFIG_PFAD};
use pulse_server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var(ENV_CONFIG).unwrap_or_else(|_| STANDARD_CONFIG_PFAD.into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let mut config = ServerConfig::laden(&config_pfad)?;
    if let Ok(adresse) = std::env::var(ENV_SERVER_ADDR) {
        config.adresse_ueberschreiben(&adresse)?;
    }

    pulse_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        relay = %config.relay_bind_adresse(),
        "Pulse Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
