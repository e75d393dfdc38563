//! Gemeinsame Identifikationstypen fuer Pulse
//!
//! Benutzer-IDs sind frei gewaehlte Strings (vom Client beansprucht),
//! Verbindungs-IDs sind serverseitig vergebene UUIDs. Das Newtype-Pattern
//! schliesst Verwechslungen zur Compilezeit aus.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Maximale Laenge einer Benutzer-ID in Bytes
pub const MAX_USER_ID_LAENGE: usize = 128;

/// Benutzer-ID (Identitaet eines Clients)
///
/// Auch beim Deserialisieren laeuft jede ID durch `UserId::parse`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Prueft und uebernimmt eine beanspruchte Benutzer-ID
    ///
    /// Abgelehnt werden leere IDs, IDs ueber `MAX_USER_ID_LAENGE` Bytes
    /// und IDs mit Steuer- oder Leerzeichen.
    pub fn parse(raw: impl Into<String>) -> CoreResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::UngueltigeUserId("leer".into()));
        }
        if raw.len() > MAX_USER_ID_LAENGE {
            return Err(CoreError::UngueltigeUserId(format!(
                "zu lang ({} Bytes, Maximum {MAX_USER_ID_LAENGE})",
                raw.len()
            )));
        }
        if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(CoreError::UngueltigeUserId(
                "enthaelt Steuer- oder Leerzeichen".into(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = CoreError;

    fn try_from(raw: String) -> CoreResult<Self> {
        Self::parse(raw)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Eindeutige ID einer einzelnen Socket-Verbindung
///
/// Dieselbe Identitaet bekommt bei jedem Reconnect eine neue ConnectionId.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Erzeugt eine neue Nachrichten-ID (UUID v4 als String)
pub fn neue_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Aktueller Zeitpunkt als Unix-Millisekunden
pub fn jetzt_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Deterministische Chat-ID fuer zwei Teilnehmer
///
/// Reihenfolgeunabhaengig: beide Seiten berechnen ohne Absprache dieselbe ID.
/// Format: die ersten 8 Bytes von SHA-256("chat_{kleiner}_{groesser}") als
/// 16 Hex-Zeichen.
pub fn chat_id(a: &UserId, b: &UserId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let digest = Sha256::digest(format!("chat_{lo}_{hi}").as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
