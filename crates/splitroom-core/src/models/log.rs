//! Log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned log identifier.
pub type LogId = i64;

/// A single monetary entry in a room.
///
/// Equality and hashing cover every field, so two records compare equal only
/// when the cached copy is identical to the server copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogRecord {
    /// Server-assigned identifier (stable across edits)
    #[serde(rename = "log_id")]
    pub id: LogId,
    /// Signed amount in the room's currency unit
    pub amount: i32,
    /// Author of the entry
    pub username: String,
    /// Optional free-form memo
    #[serde(default)]
    pub memo: Option<String>,
    /// Creation time as recorded by the server
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    /// Creation time formatted as `yy.MM.dd HH:mm` in UTC.
    #[must_use]
    pub fn created_at_label(&self) -> String {
        self.created_at.format("%y.%m.%d %H:%M").to_string()
    }

    /// Whether the memo carries any visible text.
    #[must_use]
    pub fn has_memo(&self) -> bool {
        self.memo.as_deref().is_some_and(|memo| !memo.trim().is_empty())
    }
}
