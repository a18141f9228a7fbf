//! Storebridge - live key/value storage inspection relay.
//!
//! Bridges a developer-facing inspection panel with a running mobile app so
//! storage entries can be viewed, edited, and deleted in real time. The app
//! connects to a local WebSocket port and pushes full snapshots of its
//! storage; the panel issues commands that are relayed to the app.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────┐
//!            │        Relay         │
//!            │  - Owns all state    │
//!            │  - Runs event loop   │
//!            └──────────┬───────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        │              │              │
//!        ▼              ▼              ▼
//!     Panel          Server         Cache
//!   (commands &   (WebSocket,    (last known
//!    snapshots)    single peer)    snapshot)
//! ```
//!
//! Everything is fire-and-forget: edits are not applied locally until the
//! app pushes a fresh `STORAGE_DATA`, commands issued with no app connected
//! are dropped silently, and a disconnect leaves the last snapshot visible.
//!
//! # Modules
//!
//! - [`protocol`] - wire message and panel command types
//! - [`relay`] - lifecycle controller and event loop
//! - [`panel`] - display formatting for the terminal host

pub mod panel;
pub mod protocol;
pub mod relay;

mod cache;
mod router;
mod server;

// Re-export the panel-facing surface
pub use protocol::{ProtocolMessage, StorageEntry, StorageKey, StorageSnapshot, UserCommand};
pub use relay::{Relay, RelayHandle};
