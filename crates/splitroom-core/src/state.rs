//! Session state types.

/// Outcome of the most recent room load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing fetched from the server yet, or showing cached logs after a
    /// failed fetch
    #[default]
    Offline,
    Syncing,
    Synced,
    /// The fetch failed and no cache was available to fall back on
    Error,
}

impl SyncState {
    /// Short status text for a status bar.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "sync failed",
        }
    }
}
