//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung laeuft in einem eigenen tokio-Task:
//!
//! ```text
//! Verbunden --connect (Frist)--> Zugelassen --Lese-Schleife--> Getrennt
//!     |                                                           ^
//!     +-------- Fehler / Timeout / falscher erster Frame ---------+
//! ```
//!
//! Nach der Zulassung entfernt ein Drop-Guard den Registry-Eintrag auf
//! jedem Ausstiegspfad, auch bei einem Panic im Task.
//!
//! ## Keepalive
//! - Relay sendet alle `keepalive` einen Ping
//! - Kommt innerhalb von `verbindungs_timeout` kein Frame an, wird die
//!   Verbindung getrennt und als offline gemeldet

use futures_util::{SinkExt, StreamExt};
use pulse_core::{ConnectionId, UserId};
use pulse_protocol::{FrameCodec, RelayFrame};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::dispatcher::FrameDispatcher;
use crate::error::{RelayError, RelayResult};
use crate::registry::{AdmissionResult, ConnectionRegistry};
use crate::server_state::RelayState;

/// Antworttext bei erfolgreicher Zulassung
pub const AUTH_OK_NACHRICHT: &str = "Connected to server";

type RelayFramed = Framed<TcpStream, FrameCodec>;

// ---------------------------------------------------------------------------
// RegistrierungsGuard
// ---------------------------------------------------------------------------

/// Entfernt den Registry-Eintrag beim Verlassen des Verbindungs-Tasks
struct RegistrierungsGuard {
    registry: ConnectionRegistry,
    identity: UserId,
    connection_id: ConnectionId,
}

impl Drop for RegistrierungsGuard {
    fn drop(&mut self) {
        // Nach einer Verdraengung ist die connection_id veraltet, remove ist dann ein No-op
        self.registry.remove(&self.identity, self.connection_id);
    }
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ClientConnection {
    state: Arc<RelayState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitung
    ///
    /// Laeuft bis die Verbindung getrennt, verdraengt oder der Server
    /// heruntergefahren wird.
    pub async fn verarbeiten(self, stream: TcpStream, mut shutdown_rx: watch::Receiver<bool>) {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(
            stream,
            FrameCodec::with_max_size(self.state.config.max_frame_groesse),
        );

        // Identitaets-Anspruch
        let identity = match self.authentifizieren(&mut framed).await {
            Ok(id) => id,
            Err(e) => {
                self.anspruch_ablehnen(&mut framed, e).await;
                return;
            }
        };

        if *shutdown_rx.borrow() {
            let _ = framed.send(RelayFrame::fehler("Server wird heruntergefahren")).await;
            return;
        }

        // Zulassung
        let (tx, mut rx) = mpsc::channel::<RelayFrame>(self.state.config.send_queue_groesse);
        let (connection_id, snapshot) = match self.state.registry.admit(identity.clone(), tx) {
            AdmissionResult::Admitted {
                connection_id,
                snapshot,
                ..
            } => (connection_id, snapshot),
            AdmissionResult::Rejected(e) => {
                self.anspruch_ablehnen(&mut framed, e).await;
                return;
            }
        };
        let _guard = RegistrierungsGuard {
            registry: self.state.registry.clone(),
            identity: identity.clone(),
            connection_id,
        };
        tracing::info!(peer = %peer_addr, user_id = %identity, verbindung = %connection_id, "Identitaet zugelassen");

        // Bestaetigung, dann Presence-Snapshot, danach erst die Queue
        let mut begruessung = Vec::with_capacity(snapshot.len() + 1);
        begruessung.push(RelayFrame::auth_ok(AUTH_OK_NACHRICHT));
        begruessung.extend(snapshot);
        for frame in begruessung {
            if let Err(e) = framed.send(frame).await {
                tracing::warn!(peer = %peer_addr, fehler = %e, "Begruessung fehlgeschlagen");
                return;
            }
        }

        let dispatcher =
            FrameDispatcher::neu(self.state.registry.clone(), Arc::clone(&self.state.metrics));

        let keepalive_intervall = self.state.config.keepalive;
        let timeout_dauer = self.state.config.verbindungs_timeout;
        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            let jetzt = Instant::now();
            if jetzt.duration_since(letzter_empfang) >= timeout_dauer {
                tracing::warn!(
                    user_id = %identity,
                    timeout_ms = timeout_dauer.as_millis() as u64,
                    "Verbindungs-Timeout – kein Frame empfangen"
                );
                break;
            }

            // Frueheren der beiden Zeitpunkte abwarten: Ping oder Timeout
            let ping_verzoegerung = naechster_ping.saturating_duration_since(jetzt);
            let timeout_verzoegerung =
                (letzter_empfang + timeout_dauer).saturating_duration_since(jetzt);

            tokio::select! {
                // Eingehender Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(user_id = %identity, typ = frame.typ_name(), "Frame empfangen");
                            let mut abbruch = false;
                            for antwort in dispatcher.dispatch(&identity, frame) {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(user_id = %identity, fehler = %e, "Senden fehlgeschlagen");
                                    abbruch = true;
                                    break;
                                }
                            }
                            if abbruch {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(user_id = %identity, fehler = %e, "Ungueltiger Frame – Verbindung wird getrennt");
                            let _ = framed.send(RelayFrame::fehler(format!("Ungueltiger Frame: {e}"))).await;
                            break;
                        }
                        None => {
                            tracing::info!(user_id = %identity, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehender Frame aus der Registry
                ausgehend = rx.recv() => {
                    match ausgehend {
                        Some(frame) => {
                            if let Err(e) = framed.send(frame).await {
                                tracing::warn!(user_id = %identity, fehler = %e, "Weiterleiten fehlgeschlagen");
                                break;
                            }
                        }
                        None => {
                            // Registry hat die Queue geschlossen (Verdraengung oder Ueberlauf)
                            tracing::info!(user_id = %identity, "Verbindung von der Registry beendet");
                            break;
                        }
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung.min(timeout_verzoegerung)) => {
                    if Instant::now() >= naechster_ping {
                        if let Err(e) = framed.send(RelayFrame::ping()).await {
                            tracing::warn!(user_id = %identity, fehler = %e, "Ping-Senden fehlgeschlagen");
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(user_id = %identity, "Shutdown-Signal – Verbindung wird getrennt");
                        let _ = framed.send(RelayFrame::fehler("Server wird heruntergefahren")).await;
                        break;
                    }
                }
            }
        }

        tracing::info!(peer = %peer_addr, user_id = %identity, "Verbindungs-Task beendet");
    }

    /// Wartet auf den `connect`-Frame und prueft den Anspruch
    async fn authentifizieren(&self, framed: &mut RelayFramed) -> RelayResult<UserId> {
        let erster = tokio::time::timeout(self.state.config.auth_timeout, framed.next())
            .await
            .map_err(|_| RelayError::AuthTimeout)?;

        let connect = match erster {
            None => return Err(RelayError::VerbindungGetrennt),
            Some(Err(e)) => return Err(RelayError::protokoll(e.to_string())),
            Some(Ok(RelayFrame::Connect(c))) => c,
            Some(Ok(andere)) => {
                return Err(RelayError::protokoll(format!(
                    "Erster Frame muss connect sein, erhalten: {}",
                    andere.typ_name()
                )))
            }
        };

        let identity = UserId::parse(connect.user_id)
            .map_err(|e| RelayError::UngueltigeIdentitaet(e.to_string()))?;

        if !self.state.config.token_erlaubt(connect.auth_token.as_deref()) {
            return Err(RelayError::TokenAbgelehnt);
        }
        Ok(identity)
    }

    /// Meldet einen abgelehnten Anspruch und schliesst die Verbindung
    async fn anspruch_ablehnen(&self, framed: &mut RelayFramed, fehler: RelayError) {
        if matches!(fehler, RelayError::VerbindungGetrennt) {
            tracing::debug!(peer = %self.peer_addr, "Verbindung vor connect getrennt");
            return;
        }

        tracing::warn!(peer = %self.peer_addr, fehler = %fehler, "Identitaets-Anspruch abgelehnt");
        self.state.metrics.auth_fehlgeschlagen();

        if fehler.ist_abgelehnter_anspruch() {
            let _ = framed.send(RelayFrame::auth_abgelehnt(fehler.to_string())).await;
        }
        let _ = framed.send(RelayFrame::fehler(fehler.to_string())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn presence_von(rx: &mut mpsc::Receiver<RelayFrame>, name: &str) -> Vec<bool> {
        let mut verlauf = Vec::new();
        while let Ok(f) = rx.try_recv() {
            if let RelayFrame::Presence(p) = f {
                if p.user_id == name {
                    verlauf.push(p.is_online);
                }
            }
        }
        verlauf
    }

    fn zulassen(
        registry: &ConnectionRegistry,
        name: &str,
    ) -> (ConnectionId, mpsc::Receiver<RelayFrame>) {
        let (tx, rx) = mpsc::channel(16);
        match registry.admit(uid(name), tx) {
            AdmissionResult::Admitted { connection_id, .. } => (connection_id, rx),
            AdmissionResult::Rejected(e) => panic!("Zulassung erwartet: {e}"),
        }
    }

    #[tokio::test]
    async fn panic_im_verbindungs_task_meldet_genau_einmal_offline() {
        let registry = ConnectionRegistry::default();
        let (_, mut rx_beobachter) = zulassen(&registry, "beobachter");

        let reg = registry.clone();
        let task = tokio::spawn(async move {
            let (connection_id, _rx) = zulassen(&reg, "bob");
            let _guard = RegistrierungsGuard {
                registry: reg.clone(),
                identity: uid("bob"),
                connection_id,
            };
            assert!(reg.snapshot().contains(&uid("bob")));
            panic!("Absturz im Verbindungs-Task");
        });

        let fehler = task.await.expect_err("Task muss mit Panic enden");
        assert!(fehler.is_panic());
        assert!(!registry.snapshot().contains(&uid("bob")));
        assert!(!registry.presence().ist_online(&uid("bob")));
        assert_eq!(presence_von(&mut rx_beobachter, "bob"), vec![true, false]);
    }

    #[tokio::test]
    async fn guard_einer_verdraengten_verbindung_ist_wirkungslos() {
        let registry = ConnectionRegistry::default();
        let (_, mut rx_beobachter) = zulassen(&registry, "beobachter");

        let (alt_id, _rx_alt) = zulassen(&registry, "bob");
        let (_neu_id, _rx_neu) = zulassen(&registry, "bob");
        presence_von(&mut rx_beobachter, "bob");

        drop(RegistrierungsGuard {
            registry: registry.clone(),
            identity: uid("bob"),
            connection_id: alt_id,
        });

        assert!(registry.snapshot().contains(&uid("bob")));
        assert!(presence_von(&mut rx_beobachter, "bob").is_empty());
    }
}
