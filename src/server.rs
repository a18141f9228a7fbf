//! WebSocket server and single-peer connection management.
//!
//! Listens on a local port for a connection from the running app and
//! bridges it to the relay event loop. Every producer (accept loop, peer
//! read task) sends into the same `mpsc::UnboundedSender<RelayEvent>`; the
//! relay loop receives on the corresponding receiver and dispatches.
//!
//! # Architecture
//!
//! ```text
//! Relay event loop                      App process
//! ┌──────────────────┐                 ┌──────────────────┐
//! │ ConnectionManager│                 │ storage client   │
//! │  WsServer        │◄───────────────►│  WebSocket       │
//! │  PeerConn (0..1) │  JSON frames    │                  │
//! └────────┬─────────┘                 └──────────────────┘
//!          │ RelayEvent
//!          ▼
//!    relay::event_loop
//! ```
//!
//! At most one peer is active. A new connection while one is active
//! replaces it (last-writer-wins): a relaunched app is the common case, and
//! the stale socket would otherwise hold the slot forever.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::protocol::{ProtocolMessage, UserCommand};

/// Concrete server-side WebSocket stream type.
type WsStream = WebSocketStream<TcpStream>;

/// Event delivered to the relay event loop.
///
/// Background tasks and the panel-facing handle all send through a single
/// unbounded channel, which serializes every state mutation onto the relay
/// loop and preserves arrival order end to end.
#[derive(Debug)]
pub(crate) enum RelayEvent {
    /// The accept loop completed a WebSocket handshake with a new peer.
    PeerConnected {
        /// Ready-to-use connection; the loop attaches it as the active peer.
        conn: PeerConn,
    },
    /// A peer's transport ended (close frame, EOF, or read error).
    PeerDisconnected {
        /// Id of the peer whose transport ended.
        peer_id: String,
    },
    /// A well-formed protocol message arrived from the peer.
    Inbound {
        /// Id of the originating peer.
        peer_id: String,
        /// Parsed message. May be [`ProtocolMessage::Unknown`].
        message: ProtocolMessage,
    },
    /// A command issued by the inspection panel.
    Command(UserCommand),
    /// Stop the connection manager and exit the event loop.
    Shutdown,
}

/// Relay-side state for a single connected app.
///
/// Owns the read/write tasks that bridge between the WebSocket and the
/// relay event loop, in the same shape as a socket client connection:
/// the read task parses frames into [`RelayEvent`]s, the write task drains
/// an unbounded outbound queue so senders never block.
pub(crate) struct PeerConn {
    /// Unique identifier for this peer.
    peer_id: String,
    /// Sender for outgoing WebSocket messages to this peer.
    outbound_tx: UnboundedSender<Message>,
    /// Handle to the read task (for forced teardown).
    read_handle: JoinHandle<()>,
    /// Handle to the write task (for forced teardown).
    write_handle: JoinHandle<()>,
}

impl std::fmt::Debug for PeerConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConn")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

impl PeerConn {
    /// Create a connection handler for a completed WebSocket handshake.
    ///
    /// Spawns read and write tasks:
    /// - Read task: parses text frames → sends `RelayEvent` variants
    /// - Write task: receives queued messages → writes to the socket
    fn new(peer_id: String, stream: WsStream, event_tx: UnboundedSender<RelayEvent>) -> Self {
        let (sink, source) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();

        let read_handle = tokio::spawn(Self::read_loop(
            peer_id.clone(),
            source,
            event_tx,
            outbound_tx.clone(),
        ));

        let write_handle = tokio::spawn(Self::write_loop(peer_id.clone(), sink, outbound_rx));

        Self {
            peer_id,
            outbound_tx,
            read_handle,
            write_handle,
        }
    }

    /// Queue a protocol message for this peer.
    ///
    /// Returns `false` if the message could not be queued (encode failure
    /// or write task gone).
    pub(crate) fn send(&self, message: &ProtocolMessage) -> bool {
        match message.encode() {
            Ok(frame) => self.outbound_tx.send(Message::Text(frame)).is_ok(),
            Err(e) => {
                log::error!("[Server] Failed to encode outbound message: {e}");
                false
            }
        }
    }

    /// Peer identifier.
    pub(crate) fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Tear the connection down, aborting read/write tasks.
    ///
    /// Used when a new peer replaces this one; a naturally-ended connection
    /// cleans itself up when the `PeerConn` is dropped.
    fn disconnect(self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }

    /// Read loop — parses frames and forwards them as relay events.
    ///
    /// Malformed frames (invalid JSON, binary payloads) are dropped with a
    /// warning; the connection stays open. Transport errors and close
    /// frames end the loop with a `PeerDisconnected` event.
    async fn read_loop(
        peer_id: String,
        mut source: SplitStream<WsStream>,
        event_tx: UnboundedSender<RelayEvent>,
        outbound_tx: UnboundedSender<Message>,
    ) {
        loop {
            match source.next().await {
                Some(Ok(Message::Text(frame))) => match ProtocolMessage::parse(&frame) {
                    Ok(message) => {
                        let forwarded = event_tx.send(RelayEvent::Inbound {
                            peer_id: peer_id.clone(),
                            message,
                        });
                        if forwarded.is_err() {
                            return; // Relay loop gone
                        }
                    }
                    Err(e) => {
                        log::warn!("[Server] Dropping malformed frame from {peer_id}: {e}");
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    log::warn!("[Server] Dropping binary frame from {peer_id}; protocol is text-only");
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = outbound_tx.send(Message::Pong(data));
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {
                    // Nothing to do
                }
                Some(Ok(Message::Close(_))) => {
                    log::info!("[Server] Peer closed connection: {peer_id}");
                    let _ = event_tx.send(RelayEvent::PeerDisconnected { peer_id });
                    return;
                }
                Some(Err(e)) => {
                    log::info!("[Server] Read error for {peer_id}, dropping connection: {e}");
                    let _ = event_tx.send(RelayEvent::PeerDisconnected { peer_id });
                    return;
                }
                None => {
                    log::info!("[Server] Peer disconnected: {peer_id}");
                    let _ = event_tx.send(RelayEvent::PeerDisconnected { peer_id });
                    return;
                }
            }
        }
    }

    /// Write loop — drains the outbound queue onto the socket.
    ///
    /// Exits when the queue closes (connection dropped) or a write fails;
    /// the read side reports the disconnect in either case.
    async fn write_loop(
        peer_id: String,
        mut sink: SplitSink<WsStream, Message>,
        mut outbound_rx: UnboundedReceiver<Message>,
    ) {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = sink.send(message).await {
                log::info!("[Server] Write error for {peer_id}: {e}");
                break;
            }
        }
    }
}

/// WebSocket listener for the app connection.
///
/// Binds a `TcpListener` and spawns an accept loop that performs the
/// WebSocket handshake and announces each peer to the relay via
/// [`RelayEvent::PeerConnected`].
#[derive(Debug)]
pub(crate) struct WsServer {
    /// Address actually bound (resolves port 0 to the ephemeral port).
    local_addr: SocketAddr,
    /// Handle to the accept loop task.
    accept_handle: JoinHandle<()>,
}

impl WsServer {
    /// Start listening on the given port.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound (in use, permission
    /// denied). The caller logs it; the relay simply stays stopped.
    pub(crate) async fn start(port: u16, event_tx: UnboundedSender<RelayEvent>) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind storage relay port {port}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        log::info!("[Server] Listening for app connection on {local_addr}");

        let accept_handle = tokio::spawn(Self::accept_loop(listener, event_tx));

        Ok(Self {
            local_addr,
            accept_handle,
        })
    }

    /// Accept loop — runs as a tokio task.
    async fn accept_loop(listener: TcpListener, event_tx: UnboundedSender<RelayEvent>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            log::warn!("[Server] Handshake failed for {addr}: {e}");
                            continue;
                        }
                    };

                    let peer_id = generate_peer_id();
                    log::info!("[Server] App connected: {peer_id} ({addr})");

                    let conn = PeerConn::new(peer_id, ws_stream, event_tx.clone());
                    if event_tx.send(RelayEvent::PeerConnected { conn }).is_err() {
                        log::warn!("[Server] Relay event channel closed, stopping accept loop");
                        break;
                    }
                }
                Err(e) => {
                    log::error!("[Server] Accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Address the listener is bound to.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and release the port.
    ///
    /// Waits for the aborted accept task to be dropped, so the port is
    /// genuinely free when this returns.
    pub(crate) async fn shutdown(self) {
        self.accept_handle.abort();
        let _ = self.accept_handle.await;
    }
}

/// Listener plus the single active peer slot.
///
/// Owned exclusively by the relay event loop; every mutation happens on
/// that one task, so no locking is needed.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    /// Channel shared with the accept loop and peer read tasks.
    event_tx: UnboundedSender<RelayEvent>,
    /// Listener, present while started.
    server: Option<WsServer>,
    /// The active peer, if any.
    active: Option<PeerConn>,
}

impl ConnectionManager {
    /// Create a manager that announces connections on `event_tx`.
    pub(crate) fn new(event_tx: UnboundedSender<RelayEvent>) -> Self {
        Self {
            event_tx,
            server: None,
            active: None,
        }
    }

    /// Start listening on `port`. No-op if already listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub(crate) async fn start(&mut self, port: u16) -> Result<()> {
        if self.server.is_some() {
            log::debug!("[Server] start() while already listening; ignoring");
            return Ok(());
        }
        let server = WsServer::start(port, self.event_tx.clone()).await?;
        self.server = Some(server);
        Ok(())
    }

    /// Stop the listener and drop the active peer. No-op if not started.
    pub(crate) async fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            log::info!("[Server] Stopping listener on {}", server.local_addr());
            server.shutdown().await;
        }
        if let Some(conn) = self.active.take() {
            conn.disconnect();
        }
    }

    /// Address the listener is bound to, if started.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(WsServer::local_addr)
    }

    /// Track a newly connected peer, replacing any previous one.
    pub(crate) fn attach(&mut self, conn: PeerConn) {
        if let Some(prev) = self.active.replace(conn) {
            log::info!(
                "[Server] New app connection replaces {}; dropping the old one",
                prev.peer_id()
            );
            prev.disconnect();
        }
    }

    /// Forget the active peer if `peer_id` still names it.
    ///
    /// A disconnect event from an already-replaced peer must not drop its
    /// replacement, so the id is checked before clearing the slot.
    pub(crate) fn detach(&mut self, peer_id: &str) {
        if self.active.as_ref().is_some_and(|c| c.peer_id() == peer_id) {
            self.active = None;
            log::info!("[Server] No active app connection");
        }
    }

    /// Whether a peer is currently connected.
    pub(crate) fn has_peer(&self) -> bool {
        self.active.is_some()
    }

    /// Deliver a message to the active peer.
    ///
    /// With no peer connected this is a silent no-op: panel commands are
    /// fire-and-forget and must not require app liveness.
    pub(crate) fn send(&self, message: &ProtocolMessage) {
        match &self.active {
            Some(conn) => {
                if !conn.send(message) {
                    log::debug!("[Server] Peer write queue closed; message dropped");
                }
            }
            None => {
                log::debug!("[Server] No active connection; message dropped");
            }
        }
    }

    /// Deliver a message to every connected peer.
    ///
    /// Identical to [`Self::send`] while the model is single-peer; kept as
    /// a distinct call so call sites survive a future fan-out.
    pub(crate) fn broadcast(&self, message: &ProtocolMessage) {
        self.send(message);
    }
}

/// Generate a unique peer ID using a monotonic counter + random suffix.
fn generate_peer_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("peer:{seq:x}{rand:04x}")
}
