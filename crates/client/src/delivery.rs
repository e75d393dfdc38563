//! Zustellstatus eigener und empfangener Nachrichten
//!
//! Pro Nachrichten-ID ein monotoner Zustand:
//!
//! ```text
//! Sent -> Delivered -> Read
//! ```
//!
//! Rueckschritte sind No-ops (z.B. eine verspaetete Zustellbestaetigung
//! nach der Lesebestaetigung). Unbekannte IDs werden direkt im implizierten
//! Zustand angelegt; `Read` impliziert `Delivered`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Zustellstatus einer Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
}

/// Verfolgt den Zustellstatus pro Nachrichten-ID
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    zustaende: Mutex<HashMap<String, DeliveryState>>,
}

impl DeliveryTracker {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Gibt true zurueck, wenn sich der Zustand geaendert hat
    pub fn mark_sent(&self, message_id: &str) -> bool {
        self.vorruecken(message_id, DeliveryState::Sent)
    }

    pub fn mark_delivered(&self, message_id: &str) -> bool {
        self.vorruecken(message_id, DeliveryState::Delivered)
    }

    /// Markiert mehrere Nachrichten als gelesen
    ///
    /// Gibt die IDs zurueck, deren Zustand sich tatsaechlich geaendert hat.
    pub fn mark_read<'a, I>(&self, message_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        message_ids
            .into_iter()
            .filter(|id| self.vorruecken(id, DeliveryState::Read))
            .map(str::to_string)
            .collect()
    }

    pub fn state(&self, message_id: &str) -> Option<DeliveryState> {
        self.zustaende.lock().get(message_id).copied()
    }

    fn vorruecken(&self, message_id: &str, ziel: DeliveryState) -> bool {
        let mut zustaende = self.zustaende.lock();
        match zustaende.get(message_id) {
            Some(aktuell) if *aktuell >= ziel => false,
            _ => {
                zustaende.insert(message_id.to_string(), ziel);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normaler_ablauf() {
        let t = DeliveryTracker::neu();
        assert!(t.mark_sent("m1"));
        assert_eq!(t.state("m1"), Some(DeliveryState::Sent));
        assert!(t.mark_delivered("m1"));
        assert_eq!(t.mark_read(["m1"]), vec!["m1".to_string()]);
        assert_eq!(t.state("m1"), Some(DeliveryState::Read));
    }

    #[test]
    fn zustellung_nach_lesen_ist_noop() {
        let t = DeliveryTracker::neu();
        t.mark_sent("m1");
        t.mark_read(["m1"]);
        assert!(!t.mark_delivered("m1"));
        assert!(!t.mark_sent("m1"));
        assert_eq!(t.state("m1"), Some(DeliveryState::Read));
    }

    #[test]
    fn wiederholung_aendert_nichts() {
        let t = DeliveryTracker::neu();
        assert!(t.mark_delivered("m1"));
        assert!(!t.mark_delivered("m1"));
        assert!(t.mark_read(["m1"]).len() == 1);
        assert!(t.mark_read(["m1"]).is_empty());
    }

    #[test]
    fn unbekannte_ids_im_implizierten_zustand() {
        let t = DeliveryTracker::neu();
        assert!(t.state("x").is_none());
        assert_eq!(t.mark_read(["x", "y"]).len(), 2);
        assert_eq!(t.state("x"), Some(DeliveryState::Read));
        assert!(t.mark_delivered("z"));
        assert_eq!(t.state("z"), Some(DeliveryState::Delivered));
    }

    #[test]
    fn zustaende_sind_geordnet() {
        assert!(DeliveryState::Sent < DeliveryState::Delivered);
        assert!(DeliveryState::Delivered < DeliveryState::Read);
    }
}
