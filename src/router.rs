//! Translation between panel commands, wire messages, and cache updates.
//!
//! The router is deliberately thin: each panel command maps to exactly one
//! outbound message, and the only inbound message with an effect is
//! `STORAGE_DATA`. Edits are never applied to the local cache optimistically;
//! the panel only sees a change once the app pushes a fresh snapshot.

use crate::cache::StateCache;
use crate::protocol::{ProtocolMessage, UserCommand};
use crate::server::ConnectionManager;

/// Map a panel command to its outbound wire message.
///
/// Pure; the send itself (and its silent-drop-when-disconnected semantics)
/// lives in the connection manager.
pub(crate) fn outbound(command: &UserCommand) -> ProtocolMessage {
    match command {
        UserCommand::UpdateStorage { data } => ProtocolMessage::UpdateValue { data: data.clone() },
        UserCommand::DeleteStorage { data } => ProtocolMessage::DeleteValue { data: data.clone() },
        UserCommand::RefreshStorage => ProtocolMessage::GetStorage,
    }
}

/// Handle one panel command: translate and broadcast it.
///
/// Commands are not coalesced; each becomes one message, in issue order.
pub(crate) fn handle_command(command: &UserCommand, conn: &ConnectionManager) {
    let message = outbound(command);
    log::debug!("[Router] Panel command {command:?} -> {message:?}");
    conn.broadcast(&message);
}

/// Handle one inbound wire message.
///
/// `STORAGE_DATA` replaces the cache (which notifies the panel); everything
/// else — including messages the panel itself would send and unknown types —
/// is ignored.
pub(crate) fn handle_inbound(message: ProtocolMessage, cache: &mut StateCache) {
    match message {
        ProtocolMessage::StorageData { data } => cache.replace(data),
        ProtocolMessage::Unknown => {
            log::debug!("[Router] Ignoring message with unrecognized type");
        }
        other => {
            log::warn!("[Router] Ignoring unexpected inbound message: {other:?}");
        }
    }
}
