//! pulse-relay – Nachrichten-Relay mit Presence
//!
//! Dieser Crate implementiert das zentrale Relay: Er akzeptiert viele
//! gleichzeitige Client-Verbindungen, prueft deren Identitaets-Anspruch,
//! verteilt Nachrichten, Tipp-Indikatoren und Presence und haelt den
//! Online-Zustand auch bei abrupten Verbindungsabbruechen korrekt.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  connect -> admit -> Lese-Schleife -> remove (Drop-Guard)
//!     |
//!     v
//! FrameDispatcher (Anti-Spoofing, Routing, Zustellbestaetigungen)
//!     |
//!     v
//! ConnectionRegistry (ein Lock, ein Eintrag pro Identitaet)
//!     |
//!     +-- PresenceCoordinator (Online/Offline, last_seen, Events)
//! ```
//!
//! Das Relay sieht nur verschluesselte Umschlaege, nie Klartext.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod presence;
pub mod registry;
pub mod server;
pub mod server_state;

// Bequeme Re-Exporte
pub use connection::ClientConnection;
pub use dispatcher::FrameDispatcher;
pub use error::{RelayError, RelayResult};
pub use metrics::{KeineMetriken, RelayMetrics};
pub use presence::{PresenceCoordinator, PresenceEvent, PresenceRecord};
pub use registry::{AdmissionResult, ConnectionEntry, ConnectionRegistry};
pub use server::RelayServer;
pub use server_state::{RelayConfig, RelayState};
