//! Balance model

use serde::{Deserialize, Serialize};

use super::LogRecord;
use crate::util::format_amount;

/// Running total for one user in a room, computed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub amount: i64,
    pub username: String,
}

impl BalanceRecord {
    /// Display form, e.g. `mina 12,000`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} {}", self.username, format_amount(self.amount))
    }
}

/// Server answer to a room query: the caller's balance and every log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub balance: BalanceRecord,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}
