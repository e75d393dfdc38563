//! Ereignisse des Relay-Clients fuer UI und Persistenz
//!
//! Reine Datenobjekte ohne Verweise auf Client-Interna; Verbraucher koennen
//! sie speichern, serialisieren oder an eine Oberflaeche weiterreichen.

use serde::Serialize;

use crate::delivery::DeliveryState;

/// Verbindungszustand zum Relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inhalt einer empfangenen Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBody {
    Plain(String),
    /// Inhalt konnte nicht entschluesselt werden (kein Schluessel, manipuliert, kein Umschlag)
    Undecryptable { reason: String },
}

/// Empfangene Chat-Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomingMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub timestamp: i64,
    pub reply_to_id: Option<String>,
    pub body: MessageBody,
}

/// Ereignis des Relay-Clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEvent {
    ConnectionChanged(ConnectionState),
    MessageReceived(IncomingMessage),
    Presence {
        user_id: String,
        is_online: bool,
        last_seen: Option<i64>,
    },
    Typing {
        chat_id: String,
        user_id: String,
        is_typing: bool,
    },
    DeliveryUpdated {
        message_id: String,
        state: DeliveryState,
    },
    ProfileUpdated {
        user_id: String,
        name: String,
        about: Option<String>,
        avatar_url: Option<String>,
    },
}

impl MessageBody {
    /// Klartext, falls die Nachricht entschluesselt werden konnte
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Undecryptable { .. } => None,
        }
    }
}
