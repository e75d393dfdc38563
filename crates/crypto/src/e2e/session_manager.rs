//! Sitzungsverwaltung pro Unterhaltung
//!
//! Cacht einen Sitzungsschluessel pro `chat_id`. Die Ableitung ist
//! idempotent und pro Chat durch ein eigenes Lock serialisiert, so dass
//! gleichzeitige Aufrufe fuer denselben Chat genau eine Sitzung erzeugen,
//! waehrend verschiedene Chats parallel abgeleitet werden.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use pulse_core::UserId;
use std::sync::Arc;

use crate::e2e::decrypt::decrypt;
use crate::e2e::encrypt::encrypt_with;
use crate::e2e::key_exchange::derive_session;
use crate::e2e::store::IdentityStore;
use crate::error::{CryptoError, CryptoResult};
use crate::types::{CipherAlgorithm, EncryptedPayload, PublicKey, SessionKey};

/// Abgeleitete Sitzung einer Zweier-Unterhaltung
#[derive(Debug)]
pub struct ChatSession {
    pub chat_id: String,
    pub peer: UserId,
    /// Peer-Schluessel, aus dem die Sitzung abgeleitet wurde
    pub peer_key: PublicKey,
    pub created_at: DateTime<Utc>,
    key: SessionKey,
}

impl ChatSession {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

/// Verwaltet Sitzungsschluessel fuer alle Unterhaltungen eines Clients
pub struct SessionCryptoManager {
    store: Arc<dyn IdentityStore>,
    algorithm: CipherAlgorithm,
    sessions: DashMap<String, Arc<ChatSession>>,
    derive_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionCryptoManager {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self::with_algorithm(store, CipherAlgorithm::default())
    }

    pub fn with_algorithm(store: Arc<dyn IdentityStore>, algorithm: CipherAlgorithm) -> Self {
        Self {
            store,
            algorithm,
            sessions: DashMap::new(),
            derive_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Stellt sicher, dass fuer `chat_id` eine Sitzung existiert
    ///
    /// Gibt `Ok(false)` zurueck, wenn fuer `peer` noch kein oeffentlicher
    /// Schluessel bekannt ist. Ein Cache-Treffer, dessen Peer-Schluessel
    /// inzwischen ersetzt wurde, wird neu abgeleitet.
    pub fn ensure_session(&self, peer: &UserId, chat_id: &str) -> CryptoResult<bool> {
        if self.gueltige_sitzung(peer, chat_id).is_some() {
            return Ok(true);
        }

        let lock = self.derive_locks.entry(chat_id.to_string()).or_default().clone();
        let _guard = lock.lock();

        // Ein anderer Aufrufer kann waehrend des Wartens abgeleitet haben
        if self.gueltige_sitzung(peer, chat_id).is_some() {
            return Ok(true);
        }

        let Some(peer_key) = self.store.peer_key(peer) else {
            tracing::debug!(peer = %peer, chat_id, "Kein Peer-Schluessel, Sitzung nicht moeglich");
            return Ok(false);
        };

        let key = derive_session(self.store.local_keypair(), &peer_key, chat_id)?;
        self.sessions.insert(
            chat_id.to_string(),
            Arc::new(ChatSession {
                chat_id: chat_id.to_string(),
                peer: peer.clone(),
                peer_key,
                created_at: Utc::now(),
                key,
            }),
        );
        tracing::debug!(peer = %peer, chat_id, "Sitzung abgeleitet");
        Ok(true)
    }

    /// Speichert den oeffentlichen Schluessel eines Peers
    ///
    /// Ein geaenderter Schluessel verwirft alle Sitzungen mit diesem Peer.
    /// Gibt true zurueck, wenn sich der Schluessel geaendert hat.
    pub fn store_peer_key(&self, peer: &UserId, key: PublicKey) -> bool {
        let vorher = self.store.store_peer_key(peer, key);
        if vorher == Some(key) {
            return false;
        }
        if vorher.is_some() {
            let anzahl_vorher = self.sessions.len();
            self.sessions.retain(|_, s| s.peer != *peer);
            tracing::info!(
                peer = %peer,
                verworfen = anzahl_vorher - self.sessions.len(),
                "Peer-Schluessel geaendert, Sitzungen verworfen"
            );
        }
        true
    }

    /// Verschluesselt Klartext fuer eine Unterhaltung und liefert den Umschlag
    pub fn encrypt_for_chat(
        &self,
        peer: &UserId,
        chat_id: &str,
        plaintext: &str,
    ) -> CryptoResult<String> {
        let session = self.sitzung_fuer(peer, chat_id)?;
        let payload = encrypt_with(session.key(), self.algorithm, plaintext.as_bytes())?;
        Ok(payload.to_envelope())
    }

    /// Entschluesselt einen Umschlag aus einer Unterhaltung
    pub fn decrypt_for_chat(
        &self,
        peer: &UserId,
        chat_id: &str,
        envelope: &str,
    ) -> CryptoResult<String> {
        let payload = EncryptedPayload::from_envelope(envelope)?;
        let session = self.sitzung_fuer(peer, chat_id)?;
        let plaintext = decrypt(session.key(), &payload)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Entschluesselung)
    }

    /// Gibt die gecachte Sitzung einer Unterhaltung zurueck
    pub fn session(&self, chat_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions.get(chat_id).map(|s| Arc::clone(&*s))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Verwirft die Sitzung einer Unterhaltung
    pub fn invalidate(&self, chat_id: &str) -> bool {
        self.sessions.remove(chat_id).is_some()
    }

    fn gueltige_sitzung(&self, peer: &UserId, chat_id: &str) -> Option<Arc<ChatSession>> {
        let session = self.session(chat_id)?;
        (session.peer == *peer && self.store.peer_key(peer) == Some(session.peer_key))
            .then_some(session)
    }

    fn sitzung_fuer(&self, peer: &UserId, chat_id: &str) -> CryptoResult<Arc<ChatSession>> {
        if !self.ensure_session(peer, chat_id)? {
            return Err(CryptoError::KeinPeerSchluessel(peer.to_string()));
        }
        self.gueltige_sitzung(peer, chat_id)
            .ok_or_else(|| CryptoError::KeinPeerSchluessel(peer.to_string()))
    }
}

impl std::fmt::Debug for SessionCryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCryptoManager")
            .field("local_user", self.store.local_user())
            .field("algorithm", &self.algorithm)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
