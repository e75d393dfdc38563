//! pulse-core – Gemeinsame Typen fuer Relay, Krypto und Client
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Pulse-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{CoreError, CoreResult};
pub use types::{chat_id, jetzt_millis, neue_message_id, ConnectionId, UserId};
