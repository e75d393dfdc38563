//! Metrik-Schnittstelle des Relays
//!
//! Das Relay kennt keine konkrete Metrik-Bibliothek. Der Server-Prozess
//! haengt eine Implementierung ein, die auf Prometheus abbildet.

/// Beobachter fuer Relay-Ereignisse
///
/// Alle Methoden werden synchron aufgerufen, teils unter dem Registry-Lock,
/// und duerfen daher nicht blockieren.
pub trait RelayMetrics: Send + Sync {
    /// Identitaet wurde zugelassen
    fn zugelassen(&self) {}

    /// Eintrag wurde wegen voller oder geschlossener Queue entfernt
    fn verdraengt(&self) {}

    /// Aktuelle Anzahl registrierter Verbindungen
    fn verbundene_clients(&self, _anzahl: usize) {}

    /// Presence-Frame wurde an `empfaenger` Verbindungen verteilt
    fn presence_verteilt(&self, _empfaenger: usize) {}

    /// Client-Frame wurde weitergeleitet
    fn frame_weitergeleitet(&self, _typ: &'static str) {}

    /// Identitaets-Anspruch wurde abgelehnt
    fn auth_fehlgeschlagen(&self) {}
}

/// Implementierung ohne Wirkung (Standard, Tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct KeineMetriken;

impl RelayMetrics for KeineMetriken {}
