//! Ende-zu-Ende-Verschluesselung (Client <-> Client)
//!
//! Das Relay leitet nur Umschlaege weiter und sieht weder Klartext noch
//! Schluesselmaterial.
//!
//! ## Ablauf
//! 1. Jeder Client hat ein statisches X25519-Schluessel-Paar
//! 2. Oeffentliche Schluessel werden per `profile_update` verteilt
//! 3. Pro Unterhaltung: X25519 + HKDF(salt = chat_id) → Sitzungsschluessel
//! 4. Nachrichteninhalte werden mit AES-256-GCM (oder ChaCha20-Poly1305)
//!    verschluesselt und als JSON-Umschlag versendet

pub mod decrypt;
pub mod encrypt;
pub mod key_exchange;
pub mod session_manager;
pub mod store;

pub use decrypt::decrypt;
pub use encrypt::{encrypt, encrypt_with};
pub use key_exchange::{derive_session, hkdf_derive, SESSION_INFO};
pub use session_manager::{ChatSession, SessionCryptoManager};
pub use store::{IdentityStore, MemoryIdentityStore};
