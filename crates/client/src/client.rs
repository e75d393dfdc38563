//! Relay-Client mit automatischem Wiederverbinden
//!
//! Ein Hintergrund-Task haelt die Verbindung zum Relay:
//!
//! ```text
//! Connecting -> connect-Frame -> auth_response -> Connected
//!     ^                                              |
//!     +---- Wartezeit (fest) <---- Disconnected <----+
//! ```
//!
//! Jede neue Verbindung ist eine frische Zulassung. Nach der Anmeldung
//! veroeffentlicht der Client sein Profil samt oeffentlichem Schluessel,
//! damit Gegenstellen Sitzungsschluessel ableiten koennen. Sieht er eine
//! andere Identitaet online gehen, veroeffentlicht er das Profil erneut;
//! der Presence-Snapshot bei der Anmeldung loest das nicht aus.
//!
//! Ereignisse gehen ueber einen begrenzten Kanal an die Anwendung. Ist er
//! voll, wird das Ereignis verworfen, die Verbindung laeuft weiter.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pulse_core::{chat_id, jetzt_millis, neue_message_id, UserId};
use pulse_crypto::{IdentityStore, PublicKey, SessionCryptoManager};
use pulse_protocol::{
    ChatMessage, FrameCodec, ProfileUpdateFrame, ReadReceiptFrame, RelayFrame, TypingFrame,
    DEFAULT_MAX_FRAME_SIZE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::delivery::{DeliveryState, DeliveryTracker};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, ConnectionState, IncomingMessage, MessageBody};

/// Groesse der ausgehenden Frame-Queue
const AUSGANG_QUEUE: usize = 64;

/// Standardgroesse des Ereignis-Kanals
const EREIGNIS_QUEUE: usize = 256;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Relay-Clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay-Adresse (host:port)
    pub server_addr: String,
    pub auth_token: Option<String>,
    /// Feste Wartezeit zwischen Verbindungsversuchen
    pub reconnect_intervall: Duration,
    /// Maximale Wartezeit auf die auth_response
    pub auth_timeout: Duration,
    pub anzeigename: String,
    pub about: Option<String>,
    pub avatar_url: Option<String>,
    pub max_frame_groesse: usize,
    /// Kapazitaet des Ereignis-Kanals, ueberzaehlige Ereignisse werden verworfen
    pub ereignis_queue_groesse: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:9001".to_string(),
            auth_token: None,
            reconnect_intervall: Duration::from_secs(3),
            auth_timeout: Duration::from_secs(10),
            anzeigename: String::new(),
            about: None,
            avatar_url: None,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            ereignis_queue_groesse: EREIGNIS_QUEUE,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayClient
// ---------------------------------------------------------------------------

/// Handle auf einen laufenden Relay-Client
///
/// Beim Drop wird die Verbindungsschleife beendet.
pub struct RelayClient {
    inner: Arc<ClientInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct ClientInner {
    config: ClientConfig,
    user_id: UserId,
    crypto: SessionCryptoManager,
    delivery: DeliveryTracker,
    zustand: Mutex<ConnectionState>,
    ausgang: Mutex<Option<mpsc::Sender<RelayFrame>>>,
    events: mpsc::Sender<ClientEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayClient {
    /// Startet den Client und liefert den Ereignis-Kanal
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn starten(
        config: ClientConfig,
        store: Arc<dyn IdentityStore>,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.ereignis_queue_groesse.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ClientInner {
            user_id: store.local_user().clone(),
            crypto: SessionCryptoManager::new(store),
            delivery: DeliveryTracker::neu(),
            zustand: Mutex::new(ConnectionState::Disconnected),
            ausgang: Mutex::new(None),
            events: events_tx,
            shutdown_tx,
            config,
        });

        tracing::info!(
            user_id = %inner.user_id,
            server = %inner.config.server_addr,
            "Relay-Client gestartet"
        );

        let task = tokio::spawn(verbindungs_schleife(Arc::clone(&inner), shutdown_rx));
        (
            Self {
                inner,
                task: Mutex::new(Some(task)),
            },
            events_rx,
        )
    }

    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.inner.crypto.store().local_keypair().public_key()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.zustand.lock()
    }

    pub fn delivery_state(&self, message_id: &str) -> Option<DeliveryState> {
        self.inner.delivery.state(message_id)
    }

    /// Prueft ob fuer `peer` ein oeffentlicher Schluessel bekannt ist
    pub fn kennt_peer(&self, peer: &UserId) -> bool {
        self.inner.crypto.store().peer_key(peer).is_some()
    }

    /// Verschluesselt `text` fuer `peer` und sendet die Nachricht
    ///
    /// Gibt die Nachrichten-ID zurueck. Ohne bekannten Peer-Schluessel wird
    /// nichts gesendet.
    pub fn send_message(&self, peer: &UserId, text: &str) -> ClientResult<String> {
        self.inner.nachricht_senden(peer, text, None)
    }

    /// Wie `send_message`, als Antwort auf eine vorherige Nachricht
    pub fn send_reply(&self, peer: &UserId, text: &str, reply_to_id: &str) -> ClientResult<String> {
        self.inner
            .nachricht_senden(peer, text, Some(reply_to_id.to_string()))
    }

    pub fn send_typing(&self, peer: &UserId, is_typing: bool) -> ClientResult<()> {
        self.inner.senden(RelayFrame::Typing(TypingFrame {
            chat_id: chat_id(&self.inner.user_id, peer),
            user_id: self.inner.user_id.to_string(),
            is_typing,
        }))
    }

    /// Bestaetigt das Lesen empfangener Nachrichten von `peer`
    pub fn send_read_receipt(&self, peer: &UserId, message_ids: Vec<String>) -> ClientResult<()> {
        self.inner.delivery.mark_read(message_ids.iter().map(String::as_str));
        self.inner.senden(RelayFrame::ReadReceipt(ReadReceiptFrame {
            message_ids,
            user_id: self.inner.user_id.to_string(),
            chat_id: Some(chat_id(&self.inner.user_id, peer)),
            sender_id: Some(peer.to_string()),
        }))
    }

    /// Veroeffentlicht das eigene Profil samt oeffentlichem Schluessel
    pub fn publish_profile(&self) -> ClientResult<()> {
        self.inner.profil_veroeffentlichen()
    }

    /// Beendet die Verbindungsschleife und schliesst die Verbindung
    pub async fn disconnect(&self) {
        self.inner.shutdown_tx.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Verbindungs-Task beendet mit Fehler");
            }
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.inner.shutdown_tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Verbindungsschleife
// ---------------------------------------------------------------------------

async fn verbindungs_schleife(inner: Arc<ClientInner>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        inner.zustand_setzen(ConnectionState::Connecting);
        match inner.sitzung(&mut shutdown_rx).await {
            Ok(()) => tracing::info!(user_id = %inner.user_id, "Verbindung zum Relay beendet"),
            Err(e) => {
                tracing::warn!(user_id = %inner.user_id, fehler = %e, "Verbindung zum Relay fehlgeschlagen")
            }
        }
        inner.ausgang.lock().take();
        inner.zustand_setzen(ConnectionState::Disconnected);

        if *shutdown_rx.borrow() {
            break;
        }
        tracing::debug!(
            wartezeit_ms = inner.config.reconnect_intervall.as_millis() as u64,
            "Warte auf erneuten Verbindungsversuch"
        );
        tokio::select! {
            _ = tokio::time::sleep(inner.config.reconnect_intervall) => {}
            _ = shutdown_rx.changed() => {}
        }
    }
    tracing::info!(user_id = %inner.user_id, "Relay-Client gestoppt");
}

impl ClientInner {
    /// Eine Verbindung von der Anmeldung bis zur Trennung
    async fn sitzung(&self, shutdown_rx: &mut watch::Receiver<bool>) -> ClientResult<()> {
        let stream = TcpStream::connect(&self.config.server_addr).await?;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(
            stream,
            FrameCodec::with_max_size(self.config.max_frame_groesse),
        );

        framed
            .send(RelayFrame::connect(
                self.user_id.as_str(),
                self.config.auth_token.clone(),
            ))
            .await?;

        let antwort = tokio::time::timeout(self.config.auth_timeout, framed.next())
            .await
            .map_err(|_| ClientError::Timeout)?;
        match antwort {
            Some(Ok(RelayFrame::AuthResponse(a))) if a.success => {}
            Some(Ok(RelayFrame::AuthResponse(a))) => {
                return Err(ClientError::Abgelehnt(a.message.unwrap_or_default()))
            }
            Some(Ok(RelayFrame::Error(e))) => return Err(ClientError::Abgelehnt(e.message)),
            Some(Ok(andere)) => {
                return Err(ClientError::Protokoll(format!(
                    "auth_response erwartet, erhalten: {}",
                    andere.typ_name()
                )))
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ClientError::NichtVerbunden),
        }

        let (tx, mut rx) = mpsc::channel(AUSGANG_QUEUE);
        *self.ausgang.lock() = Some(tx);
        self.zustand_setzen(ConnectionState::Connected);
        tracing::info!(user_id = %self.user_id, "Beim Relay angemeldet");

        self.profil_veroeffentlichen()?;

        loop {
            tokio::select! {
                eingehend = framed.next() => match eingehend {
                    Some(Ok(RelayFrame::Ping(ping))) => framed.send(RelayFrame::pong(&ping)).await?,
                    Some(Ok(frame)) => self.verarbeiten(frame),
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
                ausgehend = rx.recv() => match ausgehend {
                    Some(frame) => framed.send(frame).await?,
                    None => return Ok(()),
                },
                _ = shutdown_rx.changed() => {
                    // Bereits eingereihte Frames noch senden
                    while let Ok(frame) = rx.try_recv() {
                        framed.send(frame).await?;
                    }
                    framed.close().await?;
                    return Ok(());
                }
            }
        }
    }

    fn verarbeiten(&self, frame: RelayFrame) {
        match frame {
            RelayFrame::ChatMessage(m) => self.nachricht_empfangen(m),
            RelayFrame::DeliveryReceipt(r) => {
                if self.delivery.mark_delivered(&r.message_id) {
                    self.melden(ClientEvent::DeliveryUpdated {
                        message_id: r.message_id,
                        state: DeliveryState::Delivered,
                    });
                }
            }
            RelayFrame::ReadReceipt(r) => {
                let an_mich = r
                    .sender_id
                    .as_deref()
                    .map_or(true, |s| s == self.user_id.as_str());
                if r.user_id == self.user_id.as_str() || !an_mich {
                    return;
                }
                for message_id in self.delivery.mark_read(r.message_ids.iter().map(String::as_str)) {
                    self.melden(ClientEvent::DeliveryUpdated {
                        message_id,
                        state: DeliveryState::Read,
                    });
                }
            }
            RelayFrame::Typing(t) => {
                if t.user_id != self.user_id.as_str() {
                    self.melden(ClientEvent::Typing {
                        chat_id: t.chat_id,
                        user_id: t.user_id,
                        is_typing: t.is_typing,
                    });
                }
            }
            RelayFrame::Presence(p) => {
                if p.user_id == self.user_id.as_str() {
                    return;
                }
                if p.is_online && !p.snapshot {
                    // Neu hinzugekommene Gegenstellen brauchen unseren Schluessel
                    if let Err(e) = self.profil_veroeffentlichen() {
                        tracing::warn!(fehler = %e, "Profil konnte nicht veroeffentlicht werden");
                    }
                }
                self.melden(ClientEvent::Presence {
                    user_id: p.user_id,
                    is_online: p.is_online,
                    last_seen: p.last_seen,
                });
            }
            RelayFrame::ProfileUpdate(p) => self.profil_empfangen(p),
            RelayFrame::Error(e) => {
                tracing::warn!(meldung = %e.message, "Fehler-Frame vom Relay");
            }
            andere => {
                tracing::debug!(typ = andere.typ_name(), "Unerwarteter Frame ignoriert");
            }
        }
    }

    fn nachricht_empfangen(&self, m: ChatMessage) {
        let absender = match UserId::parse(m.sender_id.as_str()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(fehler = %e, "Nachricht ohne gueltigen Absender verworfen");
                return;
            }
        };
        if absender == self.user_id {
            return;
        }

        let erwartet = chat_id(&self.user_id, &absender);
        let body = if m.chat_id != erwartet {
            // Sitzungsschluessel gibt es nur fuer die Unterhaltung mit dem Absender
            tracing::warn!(
                absender = %absender,
                message_id = %m.id,
                chat_id = %m.chat_id,
                "Chat-ID passt nicht zum Absender"
            );
            MessageBody::Undecryptable {
                reason: format!(
                    "Chat-ID {} gehoert nicht zur Unterhaltung mit {absender}",
                    m.chat_id
                ),
            }
        } else {
            match self.crypto.decrypt_for_chat(&absender, &m.chat_id, &m.content) {
                Ok(text) => MessageBody::Plain(text),
                Err(e) => {
                    tracing::warn!(
                        absender = %absender,
                        message_id = %m.id,
                        fehler = %e,
                        "Nachricht nicht entschluesselbar"
                    );
                    MessageBody::Undecryptable {
                        reason: e.to_string(),
                    }
                }
            }
        };

        self.delivery.mark_delivered(&m.id);
        self.melden(ClientEvent::MessageReceived(IncomingMessage {
            id: m.id,
            chat_id: m.chat_id,
            sender_id: m.sender_id,
            sender_name: m.sender_name,
            timestamp: m.timestamp,
            reply_to_id: m.reply_to_id,
            body,
        }));
    }

    fn profil_empfangen(&self, p: ProfileUpdateFrame) {
        let peer = match UserId::parse(p.user_id.as_str()) {
            Ok(id) if id != self.user_id => id,
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(fehler = %e, "Profil ohne gueltige Identitaet verworfen");
                return;
            }
        };

        if let Some(encoded) = p.public_key.as_deref() {
            match PublicKey::from_base64(encoded) {
                Ok(key) => {
                    if self.crypto.store_peer_key(&peer, key) {
                        tracing::debug!(peer = %peer, "Peer-Schluessel gespeichert");
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, fehler = %e, "Ungueltiger Peer-Schluessel");
                }
            }
        }

        self.melden(ClientEvent::ProfileUpdated {
            user_id: p.user_id,
            name: p.name,
            about: p.about,
            avatar_url: p.avatar_url,
        });
    }

    fn nachricht_senden(
        &self,
        peer: &UserId,
        text: &str,
        reply_to_id: Option<String>,
    ) -> ClientResult<String> {
        let chat_id = chat_id(&self.user_id, peer);
        let content = self.crypto.encrypt_for_chat(peer, &chat_id, text)?;
        let id = neue_message_id();

        self.senden(RelayFrame::ChatMessage(ChatMessage {
            id: id.clone(),
            chat_id,
            sender_id: self.user_id.to_string(),
            content,
            timestamp: jetzt_millis(),
            reply_to_id,
            recipient_id: Some(peer.to_string()),
            sender_name: Some(self.config.anzeigename.clone()).filter(|n| !n.is_empty()),
        }))?;

        // Eine sehr schnelle Zustellbestaetigung hat Vorrang
        self.delivery.mark_sent(&id);
        tracing::debug!(peer = %peer, message_id = %id, "Nachricht gesendet");
        Ok(id)
    }

    fn profil_veroeffentlichen(&self) -> ClientResult<()> {
        let public_key = self.crypto.store().local_keypair().public_key();
        self.senden(RelayFrame::ProfileUpdate(ProfileUpdateFrame {
            user_id: self.user_id.to_string(),
            name: self.config.anzeigename.clone(),
            about: self.config.about.clone(),
            avatar_url: self.config.avatar_url.clone(),
            public_key: Some(public_key.to_base64()),
        }))
    }

    fn senden(&self, frame: RelayFrame) -> ClientResult<()> {
        let ausgang = self.ausgang.lock();
        let tx = ausgang.as_ref().ok_or(ClientError::NichtVerbunden)?;
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueVoll,
            mpsc::error::TrySendError::Closed(_) => ClientError::NichtVerbunden,
        })
    }

    fn zustand_setzen(&self, neu: ConnectionState) {
        let geaendert = {
            let mut zustand = self.zustand.lock();
            std::mem::replace(&mut *zustand, neu) != neu
        };
        if geaendert {
            self.melden(ClientEvent::ConnectionChanged(neu));
        }
    }

    /// Reicht ein Ereignis an die Anwendung weiter, ohne die Sitzung zu blockieren
    fn melden(&self, event: ClientEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %self.user_id, "Ereignis-Kanal voll – Ereignis verworfen");
            }
            // Ohne Empfaenger gehen Ereignisse verloren
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
