//! Application settings model

use serde::{Deserialize, Serialize};

/// Locally persisted client settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Name the user entered at login
    pub username: Option<String>,
    /// Code of the room the user last entered
    pub room_code: Option<String>,
    /// Whether server state is mirrored into the local cache
    pub live_backup: bool,
}
