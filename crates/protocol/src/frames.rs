//! Relay-Frames
//!
//! Alle Nachrichten zwischen Client und Relay sind JSON-Objekte mit einem
//! `type`-Diskriminator. Jeder Variante entspricht eine eigene Struktur,
//! damit Handler den Inhalt typsicher per `match` auspacken koennen.
//!
//! ## Richtungen
//! - Client → Relay: `connect`
//! - Relay → Client: `presence`, `delivery_receipt`, `auth_response`, `error`
//! - beide Richtungen: `message`, `typing`, `read_receipt`, `profile_update`,
//!   `ping`, `pong`
//!
//! Das Relay sendet in festen Abstaenden `ping`; jeder eingehende Frame
//! zaehlt als Lebenszeichen, `pong` ist die kuerzeste Antwort darauf.
//!
//! Felder, die das Relay ohnehin mit der authentifizierten Identitaet
//! ueberschreibt (`sender_id`, `user_id`), duerfen vom Client weggelassen werden.

use pulse_core::UserId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Frame-Strukturen
// ---------------------------------------------------------------------------

/// Identitaets-Anspruch, muss der erste Frame jeder Verbindung sein
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectFrame {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Chat-Nachricht
///
/// `content` ist fuer das Relay undurchsichtig (in der Regel ein
/// verschluesselter Umschlag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    #[serde(default)]
    pub sender_id: String,
    pub content: String,
    /// Unix-Millisekunden beim Absender
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Direkte Zustellung an genau diese Identitaet
    #[serde(default, alias = "to", skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

/// Tipp-Indikator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingFrame {
    pub chat_id: String,
    #[serde(default)]
    pub user_id: String,
    pub is_typing: bool,
}

/// Online-/Offline-Zustand einer Identitaet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceFrame {
    pub user_id: String,
    pub is_online: bool,
    /// Nur bei Offline gesetzt (Unix-Millisekunden)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    /// Teil des Snapshots direkt nach der Zulassung, kein Zustandswechsel
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub snapshot: bool,
}

/// Zustellbestaetigung, vom Relay erzeugt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceiptFrame {
    pub message_id: String,
    pub chat_id: String,
    pub delivered_to: String,
}

/// Lesebestaetigung fuer eine oder mehrere Nachrichten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceiptFrame {
    pub message_ids: Vec<String>,
    /// Leser (wird vom Relay gesetzt)
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Urspruenglicher Autor, an den die Bestaetigung geht
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

/// Ergebnis des Identitaets-Anspruchs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponseFrame {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Fehlermeldung des Relays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub message: String,
}

/// Profil-Aenderung eines Teilnehmers
///
/// `public_key` transportiert den X25519-Public-Key (Base64), damit
/// Gegenstellen Sitzungsschluessel ableiten koennen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdateFrame {
    #[serde(default)]
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Keepalive-Anfrage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingFrame {
    /// Unix-Millisekunden beim Sender
    pub timestamp: i64,
}

/// Keepalive-Antwort, spiegelt den Zeitstempel des Ping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongFrame {
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// RelayFrame
// ---------------------------------------------------------------------------

/// Alle Frame-Typen des Relay-Protokolls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    Connect(ConnectFrame),
    #[serde(rename = "message")]
    ChatMessage(ChatMessage),
    Typing(TypingFrame),
    Presence(PresenceFrame),
    DeliveryReceipt(DeliveryReceiptFrame),
    ReadReceipt(ReadReceiptFrame),
    AuthResponse(AuthResponseFrame),
    Error(ErrorFrame),
    ProfileUpdate(ProfileUpdateFrame),
    Ping(PingFrame),
    Pong(PongFrame),
}

impl RelayFrame {
    /// Name des Frame-Typs wie auf dem Draht
    pub fn typ_name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::ChatMessage(_) => "message",
            Self::Typing(_) => "typing",
            Self::Presence(_) => "presence",
            Self::DeliveryReceipt(_) => "delivery_receipt",
            Self::ReadReceipt(_) => "read_receipt",
            Self::AuthResponse(_) => "auth_response",
            Self::Error(_) => "error",
            Self::ProfileUpdate(_) => "profile_update",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }

    /// Gibt true zurueck fuer Frames, die nur das Relay erzeugen darf
    pub fn ist_relay_only(&self) -> bool {
        matches!(
            self,
            Self::Presence(_) | Self::DeliveryReceipt(_) | Self::AuthResponse(_) | Self::Error(_)
        )
    }

    pub fn connect(user_id: impl Into<String>, auth_token: Option<String>) -> Self {
        Self::Connect(ConnectFrame {
            user_id: user_id.into(),
            auth_token,
        })
    }

    pub fn ping() -> Self {
        Self::Ping(PingFrame {
            timestamp: pulse_core::jetzt_millis(),
        })
    }

    /// Antwort auf einen empfangenen Ping
    pub fn pong(ping: &PingFrame) -> Self {
        Self::Pong(PongFrame {
            timestamp: ping.timestamp,
        })
    }

    pub fn presence_online(user_id: &UserId) -> Self {
        Self::Presence(PresenceFrame {
            user_id: user_id.to_string(),
            is_online: true,
            last_seen: None,
            snapshot: false,
        })
    }

    /// Online-Eintrag des Snapshots fuer eine neu zugelassene Verbindung
    pub fn presence_snapshot(user_id: &UserId) -> Self {
        Self::Presence(PresenceFrame {
            user_id: user_id.to_string(),
            is_online: true,
            last_seen: None,
            snapshot: true,
        })
    }

    pub fn presence_offline(user_id: &UserId, last_seen: i64) -> Self {
        Self::Presence(PresenceFrame {
            user_id: user_id.to_string(),
            is_online: false,
            last_seen: Some(last_seen),
            snapshot: false,
        })
    }

    pub fn auth_ok(message: impl Into<String>) -> Self {
        Self::AuthResponse(AuthResponseFrame {
            success: true,
            message: Some(message.into()),
        })
    }

    pub fn auth_abgelehnt(message: impl Into<String>) -> Self {
        Self::AuthResponse(AuthResponseFrame {
            success: false,
            message: Some(message.into()),
        })
    }

    pub fn fehler(message: impl Into<String>) -> Self {
        Self::Error(ErrorFrame {
            message: message.into(),
        })
    }

    pub fn delivery_receipt(message: &ChatMessage, delivered_to: &UserId) -> Self {
        Self::DeliveryReceipt(DeliveryReceiptFrame {
            message_id: message.id.clone(),
            chat_id: message.chat_id.clone(),
            delivered_to: delivered_to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn chat_message_typ_heisst_message() {
        let frame = RelayFrame::ChatMessage(ChatMessage {
            id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: "alice".into(),
            content: "hallo".into(),
            timestamp: 1,
            reply_to_id: None,
            recipient_id: Some("bob".into()),
            sender_name: None,
        });
        let wert = serde_json::to_value(&frame).unwrap();
        assert_eq!(wert["type"], "message");
        assert_eq!(wert["recipient_id"], "bob");
        assert!(wert.get("reply_to_id").is_none());
        assert_eq!(frame.typ_name(), "message");
    }

    #[test]
    fn empfaenger_alias_to_wird_akzeptiert() {
        let wert = json!({
            "type": "message",
            "id": "m1",
            "chat_id": "c1",
            "content": "x",
            "timestamp": 5,
            "to": "bob"
        });
        let frame: RelayFrame = serde_json::from_value(wert).unwrap();
        match frame {
            RelayFrame::ChatMessage(m) => {
                assert_eq!(m.recipient_id.as_deref(), Some("bob"));
                // sender_id darf fehlen, das Relay setzt ihn
                assert_eq!(m.sender_id, "");
            }
            andere => panic!("Unerwarteter Frame: {andere:?}"),
        }
    }

    #[test]
    fn presence_online_ohne_last_seen() {
        let wert = serde_json::to_value(RelayFrame::presence_online(&uid("alice"))).unwrap();
        assert_eq!(
            wert,
            json!({"type": "presence", "user_id": "alice", "is_online": true})
        );
    }

    #[test]
    fn presence_offline_mit_last_seen() {
        let wert =
            serde_json::to_value(RelayFrame::presence_offline(&uid("alice"), 1234)).unwrap();
        assert_eq!(wert["is_online"], false);
        assert_eq!(wert["last_seen"], 1234);
    }

    #[test]
    fn connect_parsen() {
        let frame: RelayFrame =
            serde_json::from_str(r#"{"type":"connect","user_id":"u1"}"#).unwrap();
        assert_eq!(frame, RelayFrame::connect("u1", None));
    }

    #[test]
    fn unbekannter_typ_schlaegt_fehl() {
        let ergebnis: Result<RelayFrame, _> =
            serde_json::from_str(r#"{"type":"call_offer","user_id":"u1"}"#);
        assert!(ergebnis.is_err());
    }

    #[test]
    fn relay_only_klassifizierung() {
        assert!(RelayFrame::fehler("x").ist_relay_only());
        assert!(RelayFrame::auth_ok("ok").ist_relay_only());
        assert!(RelayFrame::presence_online(&uid("a")).ist_relay_only());
        assert!(!RelayFrame::connect("a", None).ist_relay_only());
        assert!(!RelayFrame::Typing(TypingFrame {
            chat_id: "c".into(),
            user_id: String::new(),
            is_typing: true,
        })
        .ist_relay_only());
    }

    #[test]
    fn ping_pong_spiegelt_zeitstempel() {
        let ping: RelayFrame = serde_json::from_str(r#"{"type":"ping","timestamp":42}"#).unwrap();
        let RelayFrame::Ping(p) = &ping else {
            panic!("Ping erwartet");
        };
        let pong = RelayFrame::pong(p);
        assert_eq!(
            serde_json::to_value(&pong).unwrap(),
            json!({"type": "pong", "timestamp": 42})
        );
        assert!(!ping.ist_relay_only());
        assert!(!pong.ist_relay_only());
    }

    #[test]
    fn snapshot_markierung_nur_wenn_gesetzt() {
        let live = serde_json::to_value(RelayFrame::presence_online(&uid("a"))).unwrap();
        assert!(live.get("snapshot").is_none());

        let snap = serde_json::to_value(RelayFrame::presence_snapshot(&uid("a"))).unwrap();
        assert_eq!(snap["snapshot"], json!(true));
        assert_eq!(snap["is_online"], json!(true));

        // Aeltere Relays senden das Feld nicht
        let frame: RelayFrame =
            serde_json::from_str(r#"{"type":"presence","user_id":"a","is_online":true}"#).unwrap();
        let RelayFrame::Presence(p) = frame else {
            panic!("Presence erwartet");
        };
        assert!(!p.snapshot);
    }

    #[test]
    fn read_receipt_optionale_felder() {
        let frame: RelayFrame = serde_json::from_str(
            r#"{"type":"read_receipt","message_ids":["a","b"],"sender_id":"bob"}"#,
        )
        .unwrap();
        let RelayFrame::ReadReceipt(r) = frame else {
            panic!("ReadReceipt erwartet");
        };
        assert_eq!(r.message_ids, vec!["a", "b"]);
        assert_eq!(r.sender_id.as_deref(), Some("bob"));
        assert!(r.chat_id.is_none());
    }

    #[test]
    fn delivery_receipt_aus_nachricht() {
        let msg = ChatMessage {
            id: "m9".into(),
            chat_id: "c9".into(),
            sender_id: "a".into(),
            content: String::new(),
            timestamp: 0,
            reply_to_id: None,
            recipient_id: None,
            sender_name: None,
        };
        let RelayFrame::DeliveryReceipt(r) = RelayFrame::delivery_receipt(&msg, &uid("b")) else {
            panic!("DeliveryReceipt erwartet");
        };
        assert_eq!(r.message_id, "m9");
        assert_eq!(r.chat_id, "c9");
        assert_eq!(r.delivered_to, "b");
    }
}
