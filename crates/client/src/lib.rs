//! pulse-client – Gegenstelle zum Pulse-Relay
//!
//! Haelt die Verbindung zum Relay (mit festem Wiederverbindungs-Intervall),
//! verschluesselt ausgehende Nachrichten pro Unterhaltung und liefert alle
//! eingehenden Ereignisse als reine Datenobjekte ueber einen Kanal.
//!
//! ```no_run
//! # async fn beispiel() {
//! use pulse_client::{ClientConfig, RelayClient};
//! use pulse_crypto::MemoryIdentityStore;
//! use std::sync::Arc;
//!
//! let ich = pulse_core::UserId::parse("alice").unwrap();
//! let store = Arc::new(MemoryIdentityStore::generate(ich));
//! let (client, mut events) = RelayClient::starten(ClientConfig::default(), store);
//! while let Some(ev) = events.recv().await {
//!     println!("{ev:?}");
//! }
//! # drop(client);
//! # }
//! ```

pub mod client;
pub mod delivery;
pub mod error;
pub mod events;

pub use client::{ClientConfig, RelayClient};
pub use delivery::{DeliveryState, DeliveryTracker};
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, ConnectionState, IncomingMessage, MessageBody};
