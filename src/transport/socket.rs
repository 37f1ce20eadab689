//! Duplex WebSocket pump.
//!
//! A [`Transport`] owns one WebSocket and a background task that moves text
//! frames in both directions. Inbound frames and the final close are
//! delivered, in order, on the receiver returned by [`Transport::new`].

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Message(String),
    /// The socket is gone. Always the last event.
    Close,
}

/// Internal commands for the socket task.
enum Outgoing {
    /// Write one text frame.
    Text(String),
    /// Close the socket.
    Close,
}

// ============================================================================
// Transport
// ============================================================================

/// Send half of a WebSocket pump.
///
/// Dropping the last `Transport` closes the socket.
#[derive(Debug, Clone)]
pub struct Transport {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Transport {
    /// Wraps an established WebSocket and spawns its pump task.
    ///
    /// Works for both dialled (client) and accepted (server) sockets.
    pub fn new<S>(ws_stream: WebSocketStream<S>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run(ws_stream, outgoing_rx, events_tx));

        (
            Self {
                outgoing: outgoing_tx,
            },
            events_rx,
        )
    }

    /// Queues one message for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket task has ended.
    pub fn send(&self, message: String) -> Result<()> {
        self.outgoing
            .send(Outgoing::Text(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the socket. No-op if already closed.
    pub fn close(&self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }

    /// Returns `true` once the socket task has ended.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }

    /// Socket task: pumps frames until either side closes.
    async fn run<S>(
        ws_stream: WebSocketStream<S>,
        mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let _ = events_tx.send(TransportEvent::Message(text.to_string()));
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = outgoing_rx.recv() => {
                    match command {
                        Some(Outgoing::Text(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                warn!(error = %e, "Failed to write frame");
                                break;
                            }
                        }

                        Some(Outgoing::Close) | None => {
                            debug!("Closing WebSocket");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // Reject further sends before announcing the close.
        outgoing_rx.close();
        let _ = events_tx.send(TransportEvent::Close);
        debug!("Transport task terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
