//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use pulse_relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "PULSE_CONFIG";

/// Umgebungsvariable, die die Relay-Adresse (host:port) ueberschreibt
pub const ENV_SERVER_ADDR: &str = "PULSE_SERVER_ADDR";

/// Standardpfad der Konfigurationsdatei
pub const STANDARD_CONFIG_PFAD: &str = "pulse.toml";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Relay-Einstellungen
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Bind-Adresse des Relay-Listeners
    pub bind_adresse: String,
    /// Port des Relay-Listeners
    pub port: u16,
    /// Maximale Anzahl gleichzeitig zugelassener Identitaeten
    pub max_clients: usize,
    /// Frist fuer den Identitaets-Anspruch in Sekunden
    pub auth_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Erlaubte Auth-Tokens (leer = keine Pruefung)
    pub auth_tokens: Vec<String>,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Verbindungs-Timeout in Sekunden (ohne eingehenden Frame)
    pub verbindungs_timeout_sek: u64,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 9001,
            max_clients: relay.max_clients,
            auth_timeout_sek: relay.auth_timeout.as_secs(),
            send_queue_groesse: relay.send_queue_groesse,
            max_frame_groesse: relay.max_frame_groesse,
            auth_tokens: relay.auth_tokens,
            keepalive_sek: relay.keepalive.as_secs(),
            verbindungs_timeout_sek: relay.verbindungs_timeout.as_secs(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Uebernimmt eine Relay-Adresse der Form `host:port`
    ///
    /// Wird fuer `PULSE_SERVER_ADDR` genutzt. Ohne Port bleibt der
    /// konfigurierte Port erhalten.
    pub fn adresse_ueberschreiben(&mut self, adresse: &str) -> anyhow::Result<()> {
        match adresse.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                self.relay.port = port
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Ungueltiger Port in '{adresse}': {e}"))?;
                self.relay.bind_adresse = host.to_string();
            }
            Some(_) => anyhow::bail!("Ungueltige Adresse '{adresse}'"),
            None => self.relay.bind_adresse = adresse.to_string(),
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse des Relays zurueck
    pub fn relay_bind_adresse(&self) -> String {
        format!("{}:{}", self.relay.bind_adresse, self.relay.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.relay.bind_adresse, self.observability.port)
    }

    /// Uebersetzt die Datei-Einstellungen in die Relay-Konfiguration
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            auth_timeout: Duration::from_secs(self.relay.auth_timeout_sek),
            send_queue_groesse: self.relay.send_queue_groesse,
            max_clients: self.relay.max_clients,
            max_frame_groesse: self.relay.max_frame_groesse,
            auth_tokens: self.relay.auth_tokens.clone(),
            keepalive: Duration::from_secs(self.relay.keepalive_sek),
            verbindungs_timeout: Duration::from_secs(self.relay.verbindungs_timeout_sek),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.relay.port, 9001);
        assert_eq!(cfg.relay.auth_timeout_sek, 10);
        assert_eq!(cfg.relay.send_queue_groesse, 64);
        assert_eq!(cfg.relay.max_frame_groesse, 1024 * 1024);
        assert_eq!(cfg.relay.keepalive_sek, 30);
        assert_eq!(cfg.relay.verbindungs_timeout_sek, 90);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.observability.aktiviert);
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.relay_bind_adresse(), "0.0.0.0:9001");
        assert_eq!(cfg.observability_bind_adresse(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [relay]
            port = 7000
            auth_timeout_sek = 3
            auth_tokens = ["geheim"]
            keepalive_sek = 5
            verbindungs_timeout_sek = 12

            [logging]
            format = "json"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.relay.port, 7000);
        assert_eq!(cfg.logging.format, "json");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.relay.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.logging.level, "info");

        let relay = cfg.relay_config();
        assert_eq!(relay.auth_timeout, Duration::from_secs(3));
        assert_eq!(relay.keepalive, Duration::from_secs(5));
        assert_eq!(relay.verbindungs_timeout, Duration::from_secs(12));
        assert!(relay.token_erlaubt(Some("geheim")));
        assert!(!relay.token_erlaubt(None));
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/pulse.toml").unwrap();
        assert_eq!(cfg.relay.port, 9001);
    }

    #[test]
    fn adresse_ueberschreiben() {
        let mut cfg = ServerConfig::default();
        cfg.adresse_ueberschreiben("127.0.0.1:9100").unwrap();
        assert_eq!(cfg.relay_bind_adresse(), "127.0.0.1:9100");

        cfg.adresse_ueberschreiben("localhost").unwrap();
        assert_eq!(cfg.relay_bind_adresse(), "localhost:9100");

        assert!(cfg.adresse_ueberschreiben("127.0.0.1:kein_port").is_err());
        assert!(cfg.adresse_ueberschreiben(":9000").is_err());
    }
}
