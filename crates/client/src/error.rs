//! Fehlertypen fuer den Relay-Client

use pulse_crypto::CryptoError;
use thiserror::Error;

/// Fehlertyp fuer den Relay-Client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Keine aktive Verbindung zum Relay
    #[error("Nicht mit dem Relay verbunden")]
    NichtVerbunden,

    /// Ausgehende Queue ist voll
    #[error("Sende-Queue voll")]
    QueueVoll,

    /// Relay hat den Identitaets-Anspruch abgelehnt
    #[error("Anmeldung abgelehnt: {0}")]
    Abgelehnt(String),

    /// Relay hat nicht rechtzeitig geantwortet
    #[error("Zeitueberschreitung bei der Anmeldung")]
    Timeout,

    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] CryptoError),
}

/// Result-Typ fuer den Relay-Client
pub type ClientResult<T> = Result<T, ClientError>;
