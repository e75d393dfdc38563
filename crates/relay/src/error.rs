//! Fehlertypen fuer das Relay

use thiserror::Error;

/// Fehlertyp fuer das Relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Verbindung wurde vor dem Identitaets-Anspruch getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Kein Identitaets-Anspruch innerhalb der Frist
    #[error("Zeitueberschreitung bei der Authentifizierung")]
    AuthTimeout,

    /// Protokollfehler (ungueltiger Frame, falsche Reihenfolge)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Beanspruchte Identitaet ist ungueltig
    #[error("Ungueltige Identitaet: {0}")]
    UngueltigeIdentitaet(String),

    /// Auth-Token fehlt oder ist unbekannt
    #[error("Auth-Token abgelehnt")]
    TokenAbgelehnt,

    /// Maximale Anzahl Verbindungen erreicht
    #[error("Server ist voll")]
    ServerVoll,
}

impl RelayError {
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Gibt true zurueck, wenn der Client eine `auth_response` erhalten soll
    pub fn ist_abgelehnter_anspruch(&self) -> bool {
        matches!(
            self,
            Self::UngueltigeIdentitaet(_) | Self::TokenAbgelehnt | Self::ServerVoll
        )
    }
}

/// Result-Typ fuer das Relay
pub type RelayResult<T> = Result<T, RelayError>;
