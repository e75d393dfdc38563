//! # pulse-crypto
//!
//! Ende-zu-Ende-Verschluesselung fuer Pulse-Unterhaltungen.
//!
//! ## Module
//! - `e2e` - Schluesselableitung, AEAD, Sitzungsverwaltung
//! - `identity` - X25519 Langzeit-Schluessel-Paar
//! - `types` - Gemeinsame Typen (PublicKey, Nonce, Umschlag)
//! - `error` - Fehlertypen

pub mod e2e;
pub mod error;
pub mod identity;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use identity::IdentityKeyPair;
pub use types::{CipherAlgorithm, EncryptedPayload, Nonce, PublicKey, SecretBytes, SessionKey};

pub use e2e::{
    decrypt, derive_session, encrypt, encrypt_with, ChatSession, IdentityStore,
    MemoryIdentityStore, SessionCryptoManager,
};
