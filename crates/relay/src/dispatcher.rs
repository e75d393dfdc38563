//! Frame-Dispatcher – Routet Client-Frames an ihre Empfaenger
//!
//! Der Dispatcher empfaengt die Frames einer authentifizierten Verbindung,
//! ersetzt alle Identitaetsfelder durch die authentifizierte Identitaet und
//! verteilt sie ueber die `ConnectionRegistry`.
//!
//! ## Routing
//! - `message` mit `recipient_id`: nur an diese Identitaet, danach
//!   `delivery_receipt` an den Absender
//! - `message` ohne Empfaenger: an alle anderen, ein `delivery_receipt` pro
//!   angenommener Zustellung
//! - `read_receipt` mit `sender_id`: an den urspruenglichen Autor, sonst an alle
//! - `typing`, `profile_update`: an alle anderen
//! - `ping`: `pong` direkt an den Absender, `pong`: nur Lebenszeichen
//! - Relay-eigene Frames und wiederholtes `connect`: ignoriert

use pulse_core::UserId;
use pulse_protocol::{ChatMessage, ReadReceiptFrame, RelayFrame};
use std::sync::Arc;

use crate::metrics::RelayMetrics;
use crate::registry::ConnectionRegistry;

/// Routet Frames einer authentifizierten Verbindung
pub struct FrameDispatcher {
    registry: ConnectionRegistry,
    metrics: Arc<dyn RelayMetrics>,
}

impl FrameDispatcher {
    pub fn neu(registry: ConnectionRegistry, metrics: Arc<dyn RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Verarbeitet einen Frame von `absender`
    ///
    /// Gibt die Antworten zurueck, die direkt an den Absender gehen
    /// (Zustellbestaetigungen). Diese laufen nicht ueber die Send-Queue
    /// des Absenders, da dessen Task waehrend des Dispatch nicht liest.
    pub fn dispatch(&self, absender: &UserId, frame: RelayFrame) -> Vec<RelayFrame> {
        let typ = frame.typ_name();

        match frame {
            RelayFrame::ChatMessage(mut msg) => {
                msg.sender_id = absender.to_string();
                self.metrics.frame_weitergeleitet(typ);
                self.nachricht_routen(absender, msg)
            }
            RelayFrame::Typing(mut t) => {
                t.user_id = absender.to_string();
                self.metrics.frame_weitergeleitet(typ);
                self.registry.broadcast(RelayFrame::Typing(t), Some(absender));
                Vec::new()
            }
            RelayFrame::ProfileUpdate(mut p) => {
                p.user_id = absender.to_string();
                self.metrics.frame_weitergeleitet(typ);
                self.registry
                    .broadcast(RelayFrame::ProfileUpdate(p), Some(absender));
                Vec::new()
            }
            RelayFrame::ReadReceipt(mut r) => {
                r.user_id = absender.to_string();
                self.metrics.frame_weitergeleitet(typ);
                self.lesebestaetigung_routen(absender, r);
                Vec::new()
            }
            RelayFrame::Ping(ping) => vec![RelayFrame::pong(&ping)],
            RelayFrame::Pong(_) => {
                tracing::trace!(user_id = %absender, "Pong empfangen");
                Vec::new()
            }
            RelayFrame::Connect(_) => {
                tracing::warn!(user_id = %absender, "Wiederholter connect ignoriert");
                Vec::new()
            }
            andere => {
                tracing::warn!(
                    user_id = %absender,
                    typ = andere.typ_name(),
                    "Relay-eigener Frame vom Client ignoriert"
                );
                Vec::new()
            }
        }
    }

    fn nachricht_routen(&self, absender: &UserId, msg: ChatMessage) -> Vec<RelayFrame> {
        let Some(empfaenger_roh) = msg.recipient_id.clone() else {
            let zugestellt = self
                .registry
                .broadcast(RelayFrame::ChatMessage(msg.clone()), Some(absender));
            tracing::trace!(
                user_id = %absender,
                message_id = %msg.id,
                empfaenger = zugestellt.len(),
                "Nachricht an alle verteilt"
            );
            return zugestellt
                .iter()
                .map(|e| RelayFrame::delivery_receipt(&msg, e))
                .collect();
        };

        let empfaenger = match UserId::parse(empfaenger_roh) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(user_id = %absender, fehler = %e, "Nachricht mit ungueltigem Empfaenger verworfen");
                return Vec::new();
            }
        };

        if empfaenger == *absender {
            tracing::debug!(user_id = %absender, "Nachricht an sich selbst ignoriert");
            return Vec::new();
        }

        if self
            .registry
            .send_to(&empfaenger, RelayFrame::ChatMessage(msg.clone()))
        {
            vec![RelayFrame::delivery_receipt(&msg, &empfaenger)]
        } else {
            // Kein Offline-Speicher: Nachricht geht verloren, keine Bestaetigung
            tracing::debug!(
                user_id = %absender,
                empfaenger = %empfaenger,
                message_id = %msg.id,
                "Empfaenger offline – Nachricht verworfen"
            );
            Vec::new()
        }
    }

    fn lesebestaetigung_routen(&self, absender: &UserId, receipt: ReadReceiptFrame) {
        let autor = receipt
            .sender_id
            .as_deref()
            .and_then(|s| UserId::parse(s).ok());

        match autor {
            Some(autor) if autor == *absender => {}
            Some(autor) => {
                self.registry
                    .send_to(&autor, RelayFrame::ReadReceipt(receipt));
            }
            None => {
                self.registry
                    .broadcast(RelayFrame::ReadReceipt(receipt), Some(absender));
            }
        }
    }
}
