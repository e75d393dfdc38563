//! TCP-Listener – Bindet den Socket und akzeptiert Verbindungen
//!
//! Jede Verbindung bekommt einen eigenen tokio-Task mit einer
//! `ClientConnection`. Die Registry ist der einzige geteilte, veraenderliche
//! Zustand zwischen diesen Tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::server_state::RelayState;

/// TCP-Relay-Server
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bindet den TCP-Socket
    ///
    /// Port 0 waehlt einen freien Port, siehe `local_addr`.
    pub async fn binden(state: Arc<RelayState>, addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { state, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` `true` meldet
    ///
    /// Beim Beenden werden alle verbleibenden Registry-Eintraege entfernt.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "Relay-Server gestartet");

        loop {
            tokio::select! {
                ergebnis = self.listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }
                            let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr);
                            let shutdown_rx_clone = shutdown_rx.clone();
                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        let entfernt = self.state.registry.disconnect_all();
        tracing::info!(entfernt, "Relay-Server gestoppt");
        Ok(())
    }
}
