//! Runtime listening server.
//!
//! The running application dials back to the automator, so the runtime
//! side of a launch is a WebSocket server rather than a client.
//!
//! # Connection Flow
//!
//! 1. Bind `0.0.0.0:<port>` (the application may run on another device)
//! 2. Accept loop upgrades each TCP peer to a WebSocket
//! 3. Each peer becomes the puppet's runtime connection, replacing the last
//! 4. `close()` stops the loop and releases the port

// ============================================================================
// Imports
// ============================================================================

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::protocol::Channel;
use crate::puppet::WeakPuppet;

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Accept timeout between shutdown-flag checks.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// RuntimeServer
// ============================================================================

/// Listener that turns inbound application sockets into runtime connections.
///
/// Dropping the server stops the accept loop.
#[derive(Debug)]
pub struct RuntimeServer {
    /// Port the server is bound to.
    port: u16,
    /// Shutdown flag shared with the accept loop.
    shutdown: Arc<AtomicBool>,
}

impl RuntimeServer {
    /// Binds `0.0.0.0:port` and starts accepting peers for `puppet`.
    ///
    /// Use port 0 to let the OS pick one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(port: u16, puppet: WeakPuppet) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let shutdown = Arc::new(AtomicBool::new(false));
        tokio::spawn(Self::accept_loop(listener, puppet, Arc::clone(&shutdown)));

        info!(port = actual_port, "Runtime server listening");

        Ok(Self {
            port: actual_port,
            shutdown,
        })
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the loopback URL of this server.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns `true` once [`RuntimeServer::close`] has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stops accepting peers. Established connections stay open.
    pub fn close(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            debug!(port = self.port, "Runtime server closing");
        }
    }
}

impl Drop for RuntimeServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// RuntimeServer - Accept Loop
// ============================================================================

impl RuntimeServer {
    /// Background task that accepts application peers.
    async fn accept_loop(listener: TcpListener, puppet: WeakPuppet, shutdown: Arc<AtomicBool>) {
        debug!("Accept loop started");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                debug!("Accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let puppet = puppet.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, addr, puppet).await {
                            warn!(error = %e, ?addr, "Runtime peer handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one peer and installs it as the runtime connection.
    async fn handle_connection(stream: TcpStream, addr: SocketAddr, puppet: WeakPuppet) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let Some(puppet) = puppet.upgrade() else {
            debug!(?addr, "Puppet gone, dropping runtime peer");
            return Ok(());
        };

        info!(?addr, "Runtime WebSocket connection established");

        let connection = Connection::from_stream(
            ws_stream,
            Channel::Runtime,
            puppet.adapter(),
            puppet.events().clone(),
        );
        puppet.set_runtime_connection(connection);

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::Environment;
    use crate::puppet::Puppet;
    use crate::target::{DevtoolsDescriptor, TargetDescriptor};

    fn puppet() -> Puppet {
        Puppet::new(
            "h5",
            Arc::new(TargetDescriptor::new(DevtoolsDescriptor::new("Browser"))),
            Environment::with_cwd("/"),
        )
    }

    #[tokio::test]
    async fn test_bind_random_port() {
        let puppet = puppet();
        let server = RuntimeServer::bind(0, puppet.downgrade())
            .await
            .expect("bind should succeed");

        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        server.close();
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn test_bind_busy_port_fails() {
        let puppet = puppet();
        let first = RuntimeServer::bind(0, puppet.downgrade()).await.unwrap();
        let second = RuntimeServer::bind(first.port(), puppet.downgrade()).await;
        assert!(matches!(second, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_peer_becomes_runtime_connection() {
        let puppet = puppet();
        let mut runtime = puppet.subscribe_runtime();
        let server = RuntimeServer::bind(0, puppet.downgrade()).await.unwrap();

        let (_client, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
        runtime.wait_for(Option::is_some).await.unwrap();

        let connection = puppet.runtime_connection().unwrap();
        assert_eq!(connection.namespace(), Channel::Runtime);
    }

    #[tokio::test]
    async fn test_latest_peer_replaces_previous() {
        let puppet = puppet();
        let mut runtime = puppet.subscribe_runtime();
        let server = RuntimeServer::bind(0, puppet.downgrade()).await.unwrap();

        let (_first, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
        runtime.wait_for(Option::is_some).await.unwrap();
        let first = puppet.runtime_connection().unwrap();
        runtime.mark_unchanged();

        let (_second, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
        runtime.changed().await.unwrap();
        let second = puppet.runtime_connection().unwrap();

        assert!(!first.same(&second));
    }
}
