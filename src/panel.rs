//! Presentation helpers for the inspection panel.
//!
//! The relay treats values as opaque strings; everything here is
//! display-only. `format_value` tries to pretty-print JSON payloads and
//! falls back to the raw string, and `render_snapshot` draws the key/value
//! table the terminal host prints on every refresh.

use crate::protocol::{StorageEntry, StorageKey, UserCommand};

/// Format a stored value for display.
///
/// Values that parse as JSON are pretty-printed; anything else is shown
/// verbatim. Best-effort only — a plain string like `"42"` parses as JSON
/// and is shown as a number, which is fine for an inspection view.
pub fn format_value(value: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(parsed) => serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

/// Render a snapshot as a plain-text key/value table.
pub fn render_snapshot(snapshot: &[StorageEntry]) -> String {
    if snapshot.is_empty() {
        return "(storage empty or app not connected)".to_string();
    }

    let mut out = String::new();
    for entry in snapshot {
        out.push_str(&format!("--- {} ---\n", entry.key));
        out.push_str(&format_value(&entry.value));
        out.push('\n');
    }
    out.push_str(&format!("({} entries)", snapshot.len()));
    out
}

/// Parse one line of panel input into a command.
///
/// Understands `get`/`refresh`, `set <key> <value...>`, and `del <key>`.
/// Returns `None` for anything else, including missing arguments.
pub fn parse_panel_line(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (line, ""),
    };
    match cmd {
        "get" | "refresh" => Some(UserCommand::RefreshStorage),
        "set" => {
            let (key, value) = rest.split_once(char::is_whitespace)?;
            let value = value.trim_start();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some(UserCommand::UpdateStorage {
                data: StorageEntry {
                    key: key.to_string(),
                    value: value.to_string(),
                },
            })
        }
        "del" => {
            let key = rest.split_whitespace().next()?;
            Some(UserCommand::DeleteStorage {
                data: StorageKey {
                    key: key.to_string(),
                },
            })
        }
        _ => None,
    }
}
