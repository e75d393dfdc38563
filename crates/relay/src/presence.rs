//! Presence-Koordinator – Online-/Offline-Zustand aller Identitaeten
//!
//! Zustandsautomat pro Identitaet:
//!
//! ```text
//! Offline --admit--> Online --remove--> Offline (last_seen = jetzt)
//! ```
//!
//! Keine Zwischenzustaende, kein Entprellen. Uebergaenge werden nur von der
//! `ConnectionRegistry` ausgeloest, und zwar genau einmal pro admit/remove.
//! Jeder Uebergang liefert den zu verteilenden Presence-Frame und wird
//! zusaetzlich auf einem Broadcast-Kanal fuer In-Process-Abonnenten
//! veroeffentlicht.

use dashmap::DashMap;
use pulse_core::{jetzt_millis, UserId};
use pulse_protocol::RelayFrame;
use std::sync::Arc;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Presence-Events
// ---------------------------------------------------------------------------

/// Events die der PresenceCoordinator versendet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Online { user_id: UserId },
    Offline { user_id: UserId, last_seen: i64 },
}

/// Abgeleiteter Presence-Zustand einer Identitaet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub identity: UserId,
    pub is_online: bool,
    /// Unix-Millisekunden des letzten Offline-Uebergangs
    pub last_seen: Option<i64>,
}

// ---------------------------------------------------------------------------
// PresenceCoordinator
// ---------------------------------------------------------------------------

/// Groesse des Broadcast-Kanals fuer Presence-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Haelt den Presence-Zustand aller bisher gesehenen Identitaeten
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct PresenceCoordinator {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    records: DashMap<UserId, PresenceRecord>,
    event_tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceCoordinator {
    pub fn neu() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(PresenceInner {
                records: DashMap::new(),
                event_tx,
            }),
        }
    }

    /// Uebergang nach Online; liefert `presence{is_online: true}`
    pub fn on_admit(&self, identity: &UserId) -> RelayFrame {
        self.inner.records.insert(
            identity.clone(),
            PresenceRecord {
                identity: identity.clone(),
                is_online: true,
                last_seen: None,
            },
        );
        tracing::info!(user_id = %identity, "Client online");
        let _ = self.inner.event_tx.send(PresenceEvent::Online {
            user_id: identity.clone(),
        });
        RelayFrame::presence_online(identity)
    }

    /// Uebergang nach Offline; liefert `presence{is_online: false, last_seen}`
    pub fn on_remove(&self, identity: &UserId) -> RelayFrame {
        let last_seen = jetzt_millis();
        self.inner.records.insert(
            identity.clone(),
            PresenceRecord {
                identity: identity.clone(),
                is_online: false,
                last_seen: Some(last_seen),
            },
        );
        tracing::info!(user_id = %identity, last_seen, "Client offline");
        let _ = self.inner.event_tx.send(PresenceEvent::Offline {
            user_id: identity.clone(),
            last_seen,
        });
        RelayFrame::presence_offline(identity, last_seen)
    }

    pub fn record(&self, identity: &UserId) -> Option<PresenceRecord> {
        self.inner.records.get(identity).map(|r| r.clone())
    }

    pub fn ist_online(&self, identity: &UserId) -> bool {
        self.inner
            .records
            .get(identity)
            .map(|r| r.is_online)
            .unwrap_or(false)
    }

    pub fn last_seen(&self, identity: &UserId) -> Option<i64> {
        self.inner.records.get(identity)?.last_seen
    }

    pub fn online_anzahl(&self) -> usize {
        self.inner.records.iter().filter(|r| r.is_online).count()
    }

    /// Abonniert Presence-Events
    pub fn events_abonnieren(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.event_tx.subscribe()
    }
}

impl Default for PresenceCoordinator {
    fn default() -> Self {
        Self::neu()
    }
}
