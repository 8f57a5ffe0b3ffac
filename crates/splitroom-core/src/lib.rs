//! splitroom-core - Core library for splitroom
//!
//! This crate contains the models, local cache, room service client and the
//! reconciliation logic that keeps the cache in line with the server when
//! live backup is on.

pub mod api;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod room;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use api::{HttpRoomClient, LogService, RoomKey, RoomService};
pub use backup::{BackupConfig, BackupToggle, EnableFailurePolicy};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{BalanceRecord, LogId, LogRecord, Snapshot};
pub use services::LocalStore;
pub use session::{DisplayRow, RoomSession};
pub use state::SyncState;
pub use sync::{ReconcileReport, SyncQueue};
