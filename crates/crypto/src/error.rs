//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
///
/// Entschluesselungsfehler tragen bewusst keine Details, damit ein
/// Angreifer nicht zwischen falschem Schluessel und manipuliertem
/// Ciphertext unterscheiden kann.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key-Exchange fehlgeschlagen: {0}")]
    KeyExchange(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen")]
    Entschluesselung,

    #[error("Ungueltige Nonce-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeNonce { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltiger Umschlag: {0}")]
    UngueltigerUmschlag(String),

    #[error("Kein oeffentlicher Schluessel fuer {0} bekannt")]
    KeinPeerSchluessel(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
