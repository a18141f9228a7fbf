//! Data types for the storage inspection protocol.
//!
//! This module defines the message types exchanged between the relay and
//! the running app over the WebSocket channel, plus the command surface the
//! inspection panel uses to drive the relay.
//!
//! # Message Types
//!
//! - [`ProtocolMessage`] - wire messages in both directions
//! - [`UserCommand`] - panel → relay commands
//!
//! # Wire Format
//!
//! One JSON object per WebSocket text frame, discriminated by `"type"`.
//! Field order is irrelevant. Messages with an unrecognized `"type"` parse
//! to [`ProtocolMessage::Unknown`] and are ignored by the router, so either
//! end can add message types without breaking the other. There is no
//! version field; the wire shape matches what the app-side client already
//! speaks.

use serde::{Deserialize, Serialize};

/// A single persisted key/value pair as reported by the app.
///
/// `value` is an opaque string. It may contain JSON, but nothing at the
/// protocol layer depends on that; pretty-printing is a panel concern
/// (see [`crate::panel::format_value`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Storage key.
    pub key: String,
    /// Stored value, opaque to the relay.
    pub value: String,
}

/// Full ordered view of the app's storage, as last pushed by the app.
///
/// The app is the source of truth: the relay preserves order and does not
/// deduplicate keys.
pub type StorageSnapshot = Vec<StorageEntry>;

/// Key-only payload for deletion messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKey {
    /// Key to remove from the app's storage.
    pub key: String,
}

/// Wire messages exchanged with the app.
///
/// `StorageData` flows app → relay; the rest flow relay → app. All sends
/// are fire-and-forget: there are no request ids, and `GetStorage` is
/// answered (if at all) by an uncorrelated `StorageData` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    /// Full storage snapshot pushed by the app. Replaces the cache wholesale.
    #[serde(rename = "STORAGE_DATA")]
    StorageData {
        /// The complete snapshot; never a partial diff.
        data: StorageSnapshot,
    },
    /// Upsert one key on the app side.
    #[serde(rename = "UPDATE_VALUE")]
    UpdateValue {
        /// Entry to write.
        data: StorageEntry,
    },
    /// Remove one key on the app side.
    #[serde(rename = "DELETE_VALUE")]
    DeleteValue {
        /// Key to remove.
        data: StorageKey,
    },
    /// Ask the app to push a fresh `STORAGE_DATA`.
    #[serde(rename = "GET_STORAGE")]
    GetStorage,
    /// Any message type this build does not know. Parsed successfully,
    /// then ignored by the router.
    #[serde(other)]
    Unknown,
}

impl ProtocolMessage {
    /// Parse one text frame into a protocol message.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the frame is not a valid
    /// tagged object. An unrecognized `"type"` is NOT an error; it parses
    /// to [`ProtocolMessage::Unknown`].
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Encode this message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// Commands emitted by the inspection panel.
///
/// These mirror the panel's `postMessage` shapes, discriminated by
/// `"command"`. The router turns each one into exactly one outbound
/// [`ProtocolMessage`]; none of them touch the local cache directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum UserCommand {
    /// Edit (upsert) one entry on the app.
    #[serde(rename = "updateStorage")]
    UpdateStorage {
        /// Entry to write.
        data: StorageEntry,
    },
    /// Delete one entry on the app.
    #[serde(rename = "deleteStorage")]
    DeleteStorage {
        /// Key to remove.
        data: StorageKey,
    },
    /// Re-request the full snapshot from the app.
    #[serde(rename = "refreshStorage")]
    RefreshStorage,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== ProtocolMessage Serialization Tests ==========

    #[test]
    fn test_update_value_serialization() {
        let msg = ProtocolMessage::UpdateValue {
            data: StorageEntry {
                key: "session".to_string(),
                value: "{\"token\":\"abc\"}".to_string(),
            },
        };
        let json = msg.encode().unwrap();
        assert!(json.contains(r#""type":"UPDATE_VALUE""#));
        assert!(json.contains(r#""key":"session""#));
    }

    #[test]
    fn test_delete_value_serialization() {
        let msg = ProtocolMessage::DeleteValue {
            data: StorageKey {
                key: "stale".to_string(),
            },
        };
        let json = msg.encode().unwrap();
        assert!(json.contains(r#""type":"DELETE_VALUE""#));
        assert!(json.contains(r#""key":"stale""#));
    }

    #[test]
    fn test_get_storage_serialization() {
        let json = ProtocolMessage::GetStorage.encode().unwrap();
        assert_eq!(json, r#"{"type":"GET_STORAGE"}"#);
    }

    // ========== ProtocolMessage Parsing Tests ==========

    #[test]
    fn test_storage_data_parsing() {
        let json = r#"{"type":"STORAGE_DATA","data":[{"key":"a","value":"1"},{"key":"b","value":"2"}]}"#;
        let msg = ProtocolMessage::parse(json).unwrap();
        match msg {
            ProtocolMessage::StorageData { data } => {
                assert_eq!(data.len(), 2);
                assert_eq!(data[0].key, "a");
                assert_eq!(data[1].value, "2");
            }
            other => panic!("Wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_storage_data_field_order_irrelevant() {
        let json = r#"{"data":[{"value":"1","key":"a"}],"type":"STORAGE_DATA"}"#;
        let msg = ProtocolMessage::parse(json).unwrap();
        assert!(matches!(msg, ProtocolMessage::StorageData { .. }));
    }

    #[test]
    fn test_unknown_type_parses_to_unknown() {
        let json = r#"{"type":"FUTURE_THING","data":{"whatever":true}}"#;
        let msg = ProtocolMessage::parse(json).unwrap();
        assert_eq!(msg, ProtocolMessage::Unknown);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(ProtocolMessage::parse("not json at all").is_err());
    }

    #[test]
    fn test_missing_type_is_an_error() {
        assert!(ProtocolMessage::parse(r#"{"data":[]}"#).is_err());
    }

    // ========== UserCommand Parsing Tests ==========

    #[test]
    fn test_update_storage_command_parsing() {
        let json = r#"{"command":"updateStorage","data":{"key":"theme","value":"dark"}}"#;
        let cmd: UserCommand = serde_json::from_str(json).unwrap();
        match cmd {
            UserCommand::UpdateStorage { data } => {
                assert_eq!(data.key, "theme");
                assert_eq!(data.value, "dark");
            }
            other => panic!("Wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_delete_storage_command_parsing() {
        let json = r#"{"command":"deleteStorage","data":{"key":"theme"}}"#;
        let cmd: UserCommand = serde_json::from_str(json).unwrap();
        match cmd {
            UserCommand::DeleteStorage { data } => assert_eq!(data.key, "theme"),
            other => panic!("Wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_refresh_storage_command_parsing() {
        let json = r#"{"command":"refreshStorage"}"#;
        let cmd: UserCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, UserCommand::RefreshStorage));
    }
}
