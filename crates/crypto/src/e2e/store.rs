//! Schluesselablage des Clients
//!
//! Haelt die lokale Identitaet und die bekannten oeffentlichen Schluessel
//! der Gegenstellen. Die Persistenz ist Sache der einbettenden Anwendung;
//! `MemoryIdentityStore` genuegt fuer Tests und kurzlebige Clients.

use dashmap::DashMap;
use pulse_core::UserId;

use crate::identity::IdentityKeyPair;
use crate::types::PublicKey;

/// Zugriff auf lokale Identitaet und Peer-Schluessel
pub trait IdentityStore: Send + Sync {
    fn local_user(&self) -> &UserId;

    fn local_keypair(&self) -> &IdentityKeyPair;

    fn peer_key(&self, peer: &UserId) -> Option<PublicKey>;

    /// Speichert einen Peer-Schluessel und gibt den vorherigen zurueck
    fn store_peer_key(&self, peer: &UserId, key: PublicKey) -> Option<PublicKey>;
}

/// In-Memory-Implementierung von `IdentityStore`
#[derive(Debug)]
pub struct MemoryIdentityStore {
    user: UserId,
    keypair: IdentityKeyPair,
    peers: DashMap<UserId, PublicKey>,
}

impl MemoryIdentityStore {
    pub fn new(user: UserId, keypair: IdentityKeyPair) -> Self {
        Self {
            user,
            keypair,
            peers: DashMap::new(),
        }
    }

    /// Erstellt eine Ablage mit frisch generiertem Schluessel-Paar
    pub fn generate(user: UserId) -> Self {
        Self::new(user, IdentityKeyPair::generate())
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn local_user(&self) -> &UserId {
        &self.user
    }

    fn local_keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    fn peer_key(&self, peer: &UserId) -> Option<PublicKey> {
        self.peers.get(peer).map(|k| *k)
    }

    fn store_peer_key(&self, peer: &UserId, key: PublicKey) -> Option<PublicKey> {
        self.peers.insert(peer.clone(), key)
    }
}
