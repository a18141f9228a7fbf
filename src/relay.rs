//! Relay lifecycle and event loop.
//!
//! [`Relay`] is the panel host's entry point: `activate` starts listening
//! and spawns the event loop, `deactivate` tears everything down. Both are
//! idempotent and safe to call out of order, so a host can wire them
//! directly to its own activation hooks without guarding.
//!
//! # Architecture
//!
//! One event-loop task owns the [`ConnectionManager`], [`StateCache`], and
//! router, and drains a single unbounded [`RelayEvent`] channel. Inbound
//! frames, peer lifecycle, and panel commands are all serialized through
//! that channel, so state is mutated from exactly one task and ordering is
//! preserved end to end.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::StateCache;
use crate::protocol::{StorageSnapshot, UserCommand};
use crate::router;
use crate::server::{ConnectionManager, RelayEvent};

/// Panel-facing handle to a running relay.
///
/// Cheap to clone. Commands are fire-and-forget; snapshots arrive on the
/// watch receiver whenever the app pushes fresh state.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    event_tx: UnboundedSender<RelayEvent>,
    snapshot_rx: watch::Receiver<StorageSnapshot>,
    peer_rx: watch::Receiver<bool>,
    local_addr: SocketAddr,
}

impl RelayHandle {
    /// Issue a panel command.
    ///
    /// Never fails from the panel's point of view: with no connected app
    /// the command is dropped silently, and after `deactivate` it goes
    /// nowhere.
    pub fn send_command(&self, command: UserCommand) {
        let _ = self.event_tx.send(RelayEvent::Command(command));
    }

    /// Subscribe to storage snapshots.
    ///
    /// The receiver yields the latest full snapshot after every app push.
    pub fn snapshots(&self) -> watch::Receiver<StorageSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Observe the connection lifecycle.
    ///
    /// The receiver holds `true` while an app is connected. A replaced
    /// connection stays `true`; it flips to `false` only when the active
    /// peer's transport ends.
    pub fn peer_connected(&self) -> watch::Receiver<bool> {
        self.peer_rx.clone()
    }

    /// Address the relay is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// State held while the relay is running.
#[derive(Debug)]
struct Running {
    handle: RelayHandle,
    loop_handle: JoinHandle<()>,
}

/// Start/stop controller for the storage relay.
///
/// Owns nothing while stopped; `activate` constructs the connection
/// manager, cache, and event loop, and `deactivate` drops them all.
#[derive(Debug, Default)]
pub struct Relay {
    running: Option<Running>,
}

impl Relay {
    /// Create a stopped relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the relay is currently active.
    pub fn is_active(&self) -> bool {
        self.running.is_some()
    }

    /// Start the relay on `port` (0 picks an ephemeral port).
    ///
    /// Idempotent: activating an already-active relay returns the existing
    /// handle without touching the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound; the relay stays
    /// stopped and a later `activate` retries from scratch.
    pub async fn activate(&mut self, port: u16) -> Result<RelayHandle> {
        if let Some(running) = &self.running {
            log::debug!("[Relay] activate() while already active; ignoring");
            return Ok(running.handle.clone());
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut manager = ConnectionManager::new(event_tx.clone());
        manager.start(port).await?;
        let local_addr = manager
            .local_addr()
            .context("Listener started without a bound address")?;

        let cache = StateCache::new();
        let snapshot_rx = cache.subscribe();
        let (peer_tx, peer_rx) = watch::channel(false);
        let loop_handle = tokio::spawn(event_loop(manager, cache, peer_tx, event_rx));

        log::info!("[Relay] Active on {local_addr}");

        let handle = RelayHandle {
            event_tx,
            snapshot_rx,
            peer_rx,
            local_addr,
        };
        self.running = Some(Running {
            handle: handle.clone(),
            loop_handle,
        });
        Ok(handle)
    }

    /// Stop the relay, releasing the port and dropping the cached snapshot.
    ///
    /// Idempotent, and a no-op when called before any `activate`.
    pub async fn deactivate(&mut self) {
        let Some(running) = self.running.take() else {
            log::debug!("[Relay] deactivate() while not active; ignoring");
            return;
        };

        if running.handle.event_tx.send(RelayEvent::Shutdown).is_ok() {
            let _ = running.loop_handle.await;
        } else {
            // Loop already gone; make sure the task is too.
            running.loop_handle.abort();
        }
        log::info!("[Relay] Stopped");
    }
}

/// The relay event loop.
///
/// Sole owner of the connection manager and cache. Processes events
/// strictly in arrival order and exits on [`RelayEvent::Shutdown`] or when
/// every sender is gone.
async fn event_loop(
    mut manager: ConnectionManager,
    mut cache: StateCache,
    peer_tx: watch::Sender<bool>,
    mut event_rx: UnboundedReceiver<RelayEvent>,
) {
    log::info!("[Relay] Event loop starting");

    while let Some(event) = event_rx.recv().await {
        match event {
            RelayEvent::PeerConnected { conn } => {
                manager.attach(conn);
                peer_tx.send_replace(true);
            }
            RelayEvent::PeerDisconnected { peer_id } => {
                manager.detach(&peer_id);
                peer_tx.send_replace(manager.has_peer());
            }
            RelayEvent::Inbound { message, .. } => router::handle_inbound(message, &mut cache),
            RelayEvent::Command(command) => router::handle_command(&command, &manager),
            RelayEvent::Shutdown => {
                manager.stop().await;
                break;
            }
        }
    }

    log::info!("[Relay] Event loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activate_twice_yields_one_listener() {
        let mut relay = Relay::new();
        let first = relay.activate(0).await.unwrap();
        let second = relay.activate(0).await.unwrap();

        assert_eq!(first.local_addr(), second.local_addr());
        assert!(relay.is_active());

        relay.deactivate().await;
    }

    #[tokio::test]
    async fn test_deactivate_twice_does_not_panic() {
        let mut relay = Relay::new();
        relay.activate(0).await.unwrap();
        relay.deactivate().await;
        relay.deactivate().await;
        assert!(!relay.is_active());
    }

    #[tokio::test]
    async fn test_deactivate_before_activate_is_a_noop() {
        let mut relay = Relay::new();
        relay.deactivate().await;
        assert!(!relay.is_active());
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_relay_stopped_and_retryable() {
        let mut holder = Relay::new();
        let held = holder.activate(0).await.unwrap();

        let mut relay = Relay::new();
        assert!(relay.activate(held.local_addr().port()).await.is_err());
        assert!(!relay.is_active());

        // Port freed — the user re-invoking activation succeeds.
        holder.deactivate().await;
        assert!(relay.activate(held.local_addr().port()).await.is_ok());
        relay.deactivate().await;
    }

    #[tokio::test]
    async fn test_port_released_after_deactivate() {
        let mut relay = Relay::new();
        let handle = relay.activate(0).await.unwrap();
        let port = handle.local_addr().port();
        relay.deactivate().await;

        let mut again = Relay::new();
        assert!(again.activate(port).await.is_ok());
        again.deactivate().await;
    }

    #[tokio::test]
    async fn test_commands_after_deactivate_go_nowhere() {
        let mut relay = Relay::new();
        let handle = relay.activate(0).await.unwrap();
        relay.deactivate().await;

        // Must not panic or error.
        handle.send_command(UserCommand::RefreshStorage);
    }
}
