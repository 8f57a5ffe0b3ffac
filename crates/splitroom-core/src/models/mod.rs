//! Data models for splitroom

mod balance;
mod log;
mod settings;

pub use balance::{BalanceRecord, Snapshot};
pub use log::{LogId, LogRecord};
pub use settings::Settings;
