//! Request/response correlation over a [`Transport`].
//!
//! A [`Connection`] assigns each outgoing request a fresh id, keeps the
//! completion channel in a correlation map and settles it when the matching
//! response arrives. Id-less messages are broadcast events and go to the
//! puppet's [`EventBus`] instead; they never touch the correlation map.
//!
//! # Dispatch Task
//!
//! Every connection spawns one task that consumes transport events:
//!
//! - Text frame with an id: settle the pending request (unknown ids are logged)
//! - Text frame without an id: emit `(method, params)` on the event bus
//! - Close: mark the connection closed and fail every pending request

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::identifiers::RequestId;
use crate::protocol::{Channel, Incoming, Request};
use crate::puppet::Puppet;

use super::server::RuntimeServer;
use super::socket::{Transport, TransportEvent};

// ============================================================================
// Types
// ============================================================================

/// Pending requests plus the closed flag, guarded together so a request is
/// never registered after the close drain.
#[derive(Default)]
struct CorrelationMap {
    closed: bool,
    entries: FxHashMap<RequestId, oneshot::Sender<Result<Value>>>,
}

/// Shared connection state.
struct ConnectionInner {
    /// `runtime` or `devtool`.
    namespace: Channel,
    /// Socket pump.
    transport: Transport,
    /// Correlation map (shared with the dispatch task).
    pending: Arc<Mutex<CorrelationMap>>,
    /// Method rewriting table of the owning target.
    adapter: Arc<Adapter>,
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Future of one in-flight request.
///
/// Dropping it abandons the result; the correlation entry is still removed
/// when the response or the close arrives.
#[must_use = "the response is lost if the future is dropped"]
pub struct PendingResponse {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    /// Returns the request id on the wire.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A correlated JSON-RPC connection to the application or the devtool.
///
/// Cloning is cheap and shares the same socket and correlation map.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("namespace", &self.inner.namespace)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Wraps an established WebSocket.
    ///
    /// Spawns the transport pump and the dispatch task.
    pub fn from_stream<S>(
        ws_stream: WebSocketStream<S>,
        namespace: Channel,
        adapter: Arc<Adapter>,
        events: EventBus,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, transport_rx) = Transport::new(ws_stream);
        let pending = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_dispatch(
            namespace,
            transport_rx,
            Arc::clone(&pending),
            events,
        ));

        Self {
            inner: Arc::new(ConnectionInner {
                namespace,
                transport,
                pending,
                adapter,
            }),
        }
    }

    /// Dials a WebSocket URL (client role).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `url` is not a `ws://`/`wss://` URL
    /// - [`Error::Connection`] if the handshake fails
    pub async fn connect(
        url: &str,
        namespace: Channel,
        adapter: Arc<Adapter>,
        events: EventBus,
    ) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::invalid_argument(format!("invalid WebSocket URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::invalid_argument(format!(
                "expected ws:// or wss:// URL, got {url}"
            )));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(parsed.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect to {url} failed: {e}")))?;

        info!(%url, namespace = %namespace, "WebSocket connection established");

        Ok(Self::from_stream(ws_stream, namespace, adapter, events))
    }

    /// Dials the devtool WebSocket for `puppet`.
    ///
    /// Broadcast events go to the puppet's bus and the puppet's adapter
    /// applies to every send.
    ///
    /// # Errors
    ///
    /// See [`Connection::connect`].
    pub async fn create_devtool_connection(url: &str, puppet: &Puppet) -> Result<Self> {
        Self::connect(url, Channel::Devtool, puppet.adapter(), puppet.events().clone()).await
    }

    /// Listens on `port` until the application connects back (server role).
    ///
    /// The listening server stays registered on the puppet: later peers (a
    /// remote-debug reconnect) replace the runtime connection.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the port cannot be bound
    /// - [`Error::RuntimeConnectTimeout`] if no peer connects within `wait`
    pub async fn create_runtime_connection(
        port: u16,
        puppet: &Puppet,
        wait: Duration,
    ) -> Result<Self> {
        debug!(port, "Waiting for runtime connection");

        let mut runtime_rx = puppet.subscribe_runtime();
        let server = RuntimeServer::bind(port, puppet.downgrade()).await?;
        puppet.set_runtime_server(server);

        let connected = timeout(wait, runtime_rx.wait_for(Option::is_some)).await;

        match connected {
            Ok(Ok(connection)) => match connection.as_ref() {
                Some(connection) => Ok(connection.clone()),
                None => Err(Error::ConnectionClosed),
            },
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                puppet.dispose_runtime_server();
                Err(Error::runtime_connect_timeout(wait.as_millis() as u64))
            }
        }
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Sends a request, routing through the adapter when it declares `method`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is gone (before or during)
    /// - [`Error::Remote`] with the peer's `error.message`
    /// - adapter errors, see [`Adapter::send`]
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        if self.inner.adapter.has(method) {
            trace!(namespace = %self.inner.namespace, method, "Routing through adapter");
            return self.inner.adapter.send(self.clone(), method, params).await;
        }
        self.request(method, params)?.await
    }

    /// Sends a request without consulting the adapter.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`], minus adapter errors.
    pub async fn send_direct(&self, method: &str, params: Value) -> Result<Value> {
        self.request(method, params)?.await
    }

    /// Registers and transmits a request immediately.
    ///
    /// The returned future resolves when the matching response arrives.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is gone; nothing stays
    ///   registered in that case
    /// - [`Error::Json`] if params cannot be serialized
    pub fn request(&self, method: &str, params: Value) -> Result<PendingResponse> {
        let request = Request::new(method, params);
        let id = request.id.clone();
        let data = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock();
            if pending.closed {
                return Err(Error::ConnectionClosed);
            }
            pending.entries.insert(id.clone(), tx);
        }

        trace!(namespace = %self.inner.namespace, "SEND ► {data}");

        if let Err(e) = self.inner.transport.send(data) {
            self.inner.pending.lock().entries.remove(&id);
            return Err(e);
        }

        Ok(PendingResponse { id, rx })
    }

    /// Returns `runtime` or `devtool`.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Channel {
        self.inner.namespace
    }

    /// Returns the number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().entries.len()
    }

    /// Returns `true` once the transport has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.pending.lock().closed
    }

    /// Returns `true` if both handles share one socket.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Closes the socket. Pending requests fail with `Connection closed`.
    pub fn dispose(&self) {
        debug!(namespace = %self.inner.namespace, "Disposing connection");
        self.inner.transport.close();
    }
}

// ============================================================================
// Connection - Dispatch
// ============================================================================

impl Connection {
    /// Consumes transport events until close.
    async fn run_dispatch(
        namespace: Channel,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
        pending: Arc<Mutex<CorrelationMap>>,
        events: EventBus,
    ) {
        while let Some(event) = transport_rx.recv().await {
            match event {
                TransportEvent::Message(text) => {
                    Self::handle_incoming_message(namespace, &text, &pending, &events);
                }
                TransportEvent::Close => break,
            }
        }

        Self::fail_pending_requests(namespace, &pending);
        debug!(namespace = %namespace, "Dispatch task terminated");
    }

    /// Handles one inbound text frame.
    fn handle_incoming_message(
        namespace: Channel,
        text: &str,
        pending: &Mutex<CorrelationMap>,
        events: &EventBus,
    ) {
        trace!(namespace = %namespace, "◀ RECV {text}");

        match Incoming::parse(text) {
            Ok(Incoming::Response(response)) => {
                let tx = pending.lock().entries.remove(&response.id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(response.into_result());
                    }
                    None => warn!(namespace = %namespace, id = %response.id, "Response for unknown request"),
                }
            }
            Ok(Incoming::Event(event)) => {
                events.emit(&event.method, &event.params);
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, text = %text, "Failed to parse incoming message");
            }
        }
    }

    /// Fails all pending requests with `Connection closed`.
    fn fail_pending_requests(namespace: Channel, pending: &Mutex<CorrelationMap>) {
        let drained: Vec<_> = {
            let mut pending = pending.lock();
            pending.closed = true;
            pending.entries.drain().collect()
        };
        let count = drained.len();

        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(namespace = %namespace, count, "Failed pending requests on close");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
