//! Connection-Registry – Einzige Quelle der Wahrheit fuer verbundene Clients
//!
//! Die Registry haelt pro Identitaet hoechstens einen `ConnectionEntry`.
//! Alle Aenderungen laufen unter einem einzigen Lock, damit die Folge
//! "Eintrag aendern, dann Presence verteilen" atomar bleibt:
//!
//! - Kein anderer Task sieht einen Zustand, in dem zwei Eintraege fuer
//!   dieselbe Identitaet existieren.
//! - Presence-Broadcasts verschiedener Aenderungen ueberholen sich nicht.
//!
//! Sendevorgaenge sind nicht-blockierend (`try_send` in eine begrenzte
//! Queue pro Verbindung). Eine volle oder geschlossene Queue entfernt den
//! Eintrag und loest dieselbe Offline-Behandlung aus wie ein Socket-Close.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_core::{ConnectionId, UserId};
use pulse_protocol::RelayFrame;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::metrics::{KeineMetriken, RelayMetrics};
use crate::presence::PresenceCoordinator;

/// Standard-Obergrenze fuer gleichzeitige Verbindungen
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

// ---------------------------------------------------------------------------
// ConnectionEntry
// ---------------------------------------------------------------------------

/// Registrierte Verbindung einer Identitaet
#[derive(Debug)]
pub struct ConnectionEntry {
    pub identity: UserId,
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<RelayFrame>,
}

impl ConnectionEntry {
    /// Reiht einen Frame nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    fn senden(&self, frame: RelayFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %self.identity, "Send-Queue voll – Verbindung wird entfernt");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(user_id = %self.identity, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

/// Ergebnis von `ConnectionRegistry::admit`
#[derive(Debug)]
pub enum AdmissionResult {
    Admitted {
        connection_id: ConnectionId,
        /// Eine vorherige Verbindung derselben Identitaet wurde verdraengt
        replaced: bool,
        /// Online-Presence aller anderen Identitaeten zum Zeitpunkt der Zulassung
        ///
        /// Muss vor allen Frames aus der Queue gesendet werden.
        snapshot: Vec<RelayFrame>,
    },
    Rejected(RelayError),
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Registry aller zugelassenen Verbindungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    eintraege: Mutex<HashMap<UserId, ConnectionEntry>>,
    presence: PresenceCoordinator,
    max_clients: usize,
    metrics: Arc<dyn RelayMetrics>,
}

impl ConnectionRegistry {
    pub fn neu(max_clients: usize, metrics: Arc<dyn RelayMetrics>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                eintraege: Mutex::new(HashMap::new()),
                presence: PresenceCoordinator::neu(),
                max_clients,
                metrics,
            }),
        }
    }

    pub fn presence(&self) -> &PresenceCoordinator {
        &self.inner.presence
    }

    /// Laesst eine Identitaet mit ihrer Send-Queue zu
    ///
    /// Existiert bereits ein Eintrag, wird dessen Queue geschlossen und
    /// zuerst Offline, dann Online verteilt. Alles geschieht unter einem
    /// Lock; der zurueckgegebene Snapshot ist damit nie aelter als die
    /// Broadcasts, die danach in der neuen Queue landen.
    pub fn admit(&self, identity: UserId, tx: mpsc::Sender<RelayFrame>) -> AdmissionResult {
        let mut eintraege = self.inner.eintraege.lock();

        let vorheriger = eintraege.remove(&identity);
        if vorheriger.is_none() && eintraege.len() >= self.inner.max_clients {
            tracing::warn!(
                user_id = %identity,
                max = self.inner.max_clients,
                "Server voll – Verbindung abgelehnt"
            );
            return AdmissionResult::Rejected(RelayError::ServerVoll);
        }

        let replaced = vorheriger.is_some();
        if let Some(alt) = vorheriger {
            tracing::info!(
                user_id = %identity,
                alte_verbindung = %alt.connection_id,
                "Bestehende Verbindung wird verdraengt"
            );
            // Drop schliesst die alte Queue, der alte Verbindungs-Task endet
            drop(alt);
            let offline = self.inner.presence.on_remove(&identity);
            self.verteilen_locked(&mut eintraege, offline, Some(&identity), true);
        }

        let snapshot: Vec<RelayFrame> = eintraege
            .keys()
            .map(RelayFrame::presence_snapshot)
            .collect();

        let connection_id = ConnectionId::new();
        eintraege.insert(
            identity.clone(),
            ConnectionEntry {
                identity: identity.clone(),
                connection_id,
                connected_at: Utc::now(),
                tx,
            },
        );
        self.inner.metrics.zugelassen();

        let online = self.inner.presence.on_admit(&identity);
        self.verteilen_locked(&mut eintraege, online, Some(&identity), true);
        self.inner.metrics.verbundene_clients(eintraege.len());

        tracing::debug!(user_id = %identity, verbindung = %connection_id, replaced, "Identitaet zugelassen");
        AdmissionResult::Admitted {
            connection_id,
            replaced,
            snapshot,
        }
    }

    /// Entfernt den Eintrag einer Verbindung und verteilt Offline
    ///
    /// Gehoert `connection_id` nicht (mehr) zum aktuellen Eintrag der
    /// Identitaet, ist der Aufruf veraltet und bewirkt nichts.
    pub fn remove(&self, identity: &UserId, connection_id: ConnectionId) -> Option<ConnectionEntry> {
        let mut eintraege = self.inner.eintraege.lock();

        match eintraege.get(identity) {
            Some(e) if e.connection_id == connection_id => {}
            _ => {
                tracing::debug!(user_id = %identity, verbindung = %connection_id, "Veraltetes remove ignoriert");
                return None;
            }
        }

        let entry = eintraege.remove(identity)?;
        let offline = self.inner.presence.on_remove(identity);
        self.verteilen_locked(&mut eintraege, offline, Some(identity), true);
        self.inner.metrics.verbundene_clients(eintraege.len());
        Some(entry)
    }

    /// Verteilt einen Frame an alle Verbindungen ausser `exclude`
    ///
    /// Gibt die Identitaeten zurueck, deren Queue den Frame angenommen hat.
    pub fn broadcast(&self, frame: RelayFrame, exclude: Option<&UserId>) -> Vec<UserId> {
        let mut eintraege = self.inner.eintraege.lock();
        let zugestellt = self.verteilen_locked(&mut eintraege, frame, exclude, false);
        self.inner.metrics.verbundene_clients(eintraege.len());
        zugestellt
    }

    /// Sendet einen Frame an genau eine Identitaet
    pub fn send_to(&self, identity: &UserId, frame: RelayFrame) -> bool {
        let mut eintraege = self.inner.eintraege.lock();

        let angenommen = match eintraege.get(identity) {
            Some(entry) => entry.senden(frame),
            None => {
                tracing::debug!(user_id = %identity, "Senden an nicht verbundene Identitaet");
                return false;
            }
        };

        if !angenommen {
            self.verdraengen_locked(&mut eintraege, vec![identity.clone()]);
            self.inner.metrics.verbundene_clients(eintraege.len());
        }
        angenommen
    }

    /// Menge aller aktuell registrierten Identitaeten
    pub fn snapshot(&self) -> BTreeSet<UserId> {
        self.inner.eintraege.lock().keys().cloned().collect()
    }

    pub fn anzahl(&self) -> usize {
        self.inner.eintraege.lock().len()
    }

    /// Entfernt alle Eintraege (Shutdown)
    ///
    /// Jede Identitaet endet Offline. Es wird nichts mehr verteilt, da alle
    /// Queues gleichzeitig geschlossen werden.
    pub fn disconnect_all(&self) -> usize {
        let mut eintraege = self.inner.eintraege.lock();
        let anzahl = eintraege.len();
        for (identity, _) in eintraege.drain() {
            self.inner.presence.on_remove(&identity);
        }
        self.inner.metrics.verbundene_clients(0);
        tracing::info!(anzahl, "Alle Verbindungen entfernt");
        anzahl
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden (Lock wird vom Aufrufer gehalten)
    // -----------------------------------------------------------------------

    /// Verteilt einen Frame und behandelt fehlgeschlagene Queues kaskadierend
    fn verteilen_locked(
        &self,
        eintraege: &mut HashMap<UserId, ConnectionEntry>,
        frame: RelayFrame,
        exclude: Option<&UserId>,
        ist_presence: bool,
    ) -> Vec<UserId> {
        let mut zugestellt = Vec::new();
        let mut fehlgeschlagen = Vec::new();

        for (id, entry) in eintraege.iter() {
            if Some(id) == exclude {
                continue;
            }
            if entry.senden(frame.clone()) {
                zugestellt.push(id.clone());
            } else {
                fehlgeschlagen.push(id.clone());
            }
        }
        if ist_presence {
            self.inner.metrics.presence_verteilt(zugestellt.len());
        }

        self.verdraengen_locked(eintraege, fehlgeschlagen);
        zugestellt
    }

    /// Entfernt Eintraege mit toter Queue und verteilt deren Offline-Presence
    ///
    /// Jede Offline-Verteilung kann weitere tote Queues aufdecken; die
    /// Schleife laeuft, bis keine mehr uebrig sind.
    fn verdraengen_locked(
        &self,
        eintraege: &mut HashMap<UserId, ConnectionEntry>,
        fehlgeschlagen: Vec<UserId>,
    ) {
        let mut ausstehend: VecDeque<UserId> = fehlgeschlagen.into();

        while let Some(identity) = ausstehend.pop_front() {
            if eintraege.remove(&identity).is_none() {
                continue;
            }
            self.inner.metrics.verdraengt();
            let offline = self.inner.presence.on_remove(&identity);

            let mut zugestellt = 0;
            for (id, entry) in eintraege.iter() {
                if entry.senden(offline.clone()) {
                    zugestellt += 1;
                } else if !ausstehend.contains(id) {
                    ausstehend.push_back(id.clone());
                }
            }
            self.inner.metrics.presence_verteilt(zugestellt);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::neu(DEFAULT_MAX_CLIENTS, Arc::new(KeineMetriken))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_protocol::{PresenceFrame, TypingFrame};

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn zulassen(
        reg: &ConnectionRegistry,
        name: &str,
        queue: usize,
    ) -> (ConnectionId, mpsc::Receiver<RelayFrame>) {
        let (tx, rx) = mpsc::channel(queue);
        match reg.admit(uid(name), tx) {
            AdmissionResult::Admitted { connection_id, .. } => (connection_id, rx),
            AdmissionResult::Rejected(e) => panic!("Zulassung abgelehnt: {e}"),
        }
    }

    fn alle(rx: &mut mpsc::Receiver<RelayFrame>) -> Vec<RelayFrame> {
        let mut frames = Vec::new();
        while let Ok(f) = rx.try_recv() {
            frames.push(f);
        }
        frames
    }

    fn presence_von(frames: &[RelayFrame], name: &str) -> Vec<bool> {
        frames
            .iter()
            .filter_map(|f| match f {
                RelayFrame::Presence(PresenceFrame {
                    user_id, is_online, ..
                }) if user_id == name => Some(*is_online),
                _ => None,
            })
            .collect()
    }

    fn tipp() -> RelayFrame {
        RelayFrame::Typing(TypingFrame {
            chat_id: "c".into(),
            user_id: "x".into(),
            is_typing: true,
        })
    }

    #[test]
    fn zulassung_verteilt_online_und_liefert_snapshot() {
        let reg = ConnectionRegistry::default();
        let (_, mut rx_a) = zulassen(&reg, "alice", 8);

        let (tx, _rx_b) = mpsc::channel(8);
        let AdmissionResult::Admitted {
            snapshot, replaced, ..
        } = reg.admit(uid("bob"), tx)
        else {
            panic!("Zulassung erwartet");
        };

        assert!(!replaced);
        assert_eq!(snapshot, vec![RelayFrame::presence_snapshot(&uid("alice"))]);
        assert_eq!(presence_von(&alle(&mut rx_a), "bob"), vec![true]);
        assert_eq!(reg.snapshot(), BTreeSet::from([uid("alice"), uid("bob")]));
    }

    #[test]
    fn ersetzung_erzeugt_genau_offline_dann_online() {
        let reg = ConnectionRegistry::default();
        let (_, mut rx_beobachter) = zulassen(&reg, "beobachter", 16);
        let (alt_id, mut rx_alt) = zulassen(&reg, "alice", 16);
        alle(&mut rx_beobachter);

        let (tx, _rx_neu) = mpsc::channel(16);
        let AdmissionResult::Admitted {
            connection_id,
            replaced,
            ..
        } = reg.admit(uid("alice"), tx)
        else {
            panic!("Zulassung erwartet");
        };

        assert!(replaced);
        assert_ne!(connection_id, alt_id);
        assert_eq!(
            presence_von(&alle(&mut rx_beobachter), "alice"),
            vec![false, true]
        );
        // Alte Queue ist geschlossen
        assert!(matches!(
            rx_alt.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(reg.anzahl(), 2);
    }

    #[test]
    fn veraltetes_remove_ist_wirkungslos() {
        let reg = ConnectionRegistry::default();
        let (_, mut rx_beobachter) = zulassen(&reg, "beobachter", 16);
        let (alt_id, _rx_alt) = zulassen(&reg, "alice", 16);
        let (neu_id, _rx_neu) = zulassen(&reg, "alice", 16);
        alle(&mut rx_beobachter);

        assert!(reg.remove(&uid("alice"), alt_id).is_none());
        assert!(presence_von(&alle(&mut rx_beobachter), "alice").is_empty());
        assert!(reg.presence().ist_online(&uid("alice")));

        let entry = reg.remove(&uid("alice"), neu_id).expect("Eintrag erwartet");
        assert_eq!(entry.connection_id, neu_id);
        assert_eq!(presence_von(&alle(&mut rx_beobachter), "alice"), vec![false]);
        assert!(!reg.presence().ist_online(&uid("alice")));
        assert!(reg.presence().last_seen(&uid("alice")).is_some());
    }

    #[test]
    fn broadcast_schliesst_absender_aus() {
        let reg = ConnectionRegistry::default();
        let (_, mut rx_a) = zulassen(&reg, "alice", 8);
        let (_, mut rx_b) = zulassen(&reg, "bob", 8);
        alle(&mut rx_a);

        let zugestellt = reg.broadcast(tipp(), Some(&uid("alice")));
        assert_eq!(zugestellt, vec![uid("bob")]);
        assert!(alle(&mut rx_a).is_empty());
        assert!(alle(&mut rx_b).contains(&tipp()));
    }

    #[test]
    fn geschlossene_queue_kaskadiert_offline() {
        let reg = ConnectionRegistry::default();
        let (_, mut rx_a) = zulassen(&reg, "alice", 8);
        let (_, rx_b) = zulassen(&reg, "bob", 8);
        alle(&mut rx_a);

        // Empfaenger von bob verschwindet ohne remove
        drop(rx_b);
        let zugestellt = reg.broadcast(tipp(), None);

        assert_eq!(zugestellt, vec![uid("alice")]);
        assert_eq!(reg.snapshot(), BTreeSet::from([uid("alice")]));
        assert!(!reg.presence().ist_online(&uid("bob")));
        let frames = alle(&mut rx_a);
        assert_eq!(presence_von(&frames, "bob"), vec![false]);
    }

    #[test]
    fn volle_queue_entfernt_eintrag() {
        let reg = ConnectionRegistry::default();
        let (_, mut rx_a) = zulassen(&reg, "alice", 64);
        let (_, _rx_langsam) = zulassen(&reg, "langsam", 1);
        alle(&mut rx_a);

        assert!(reg.send_to(&uid("langsam"), tipp()));
        assert!(!reg.send_to(&uid("langsam"), tipp()));

        assert!(!reg.snapshot().contains(&uid("langsam")));
        assert_eq!(presence_von(&alle(&mut rx_a), "langsam"), vec![false]);
    }

    #[test]
    fn senden_an_unbekannte_identitaet() {
        let reg = ConnectionRegistry::default();
        assert!(!reg.send_to(&uid("niemand"), tipp()));
    }

    #[test]
    fn server_voll_lehnt_ab_aber_ersetzung_geht() {
        let reg = ConnectionRegistry::neu(1, Arc::new(KeineMetriken));
        let (_, _rx_a) = zulassen(&reg, "alice", 8);

        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            reg.admit(uid("bob"), tx),
            AdmissionResult::Rejected(RelayError::ServerVoll)
        ));

        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            reg.admit(uid("alice"), tx),
            AdmissionResult::Admitted { replaced: true, .. }
        ));
    }

    #[test]
    fn disconnect_all_setzt_alle_offline() {
        let reg = ConnectionRegistry::default();
        let (_, _a) = zulassen(&reg, "alice", 8);
        let (_, _b) = zulassen(&reg, "bob", 8);

        assert_eq!(reg.disconnect_all(), 2);
        assert!(reg.snapshot().is_empty());
        assert!(!reg.presence().ist_online(&uid("alice")));
        assert!(!reg.presence().ist_online(&uid("bob")));
    }

    #[test]
    fn gleichzeitige_zulassung_derselben_identitaet() {
        let reg = ConnectionRegistry::default();
        let receiver: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let (tx, rx) = mpsc::channel(8);
                        let _ = reg.admit(uid("alice"), tx);
                        rx
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(reg.anzahl(), 1);
        // Genau eine Queue ist noch offen
        let offen = receiver.iter().filter(|rx| !rx.is_closed()).count();
        assert_eq!(offen, 1);
    }
}
