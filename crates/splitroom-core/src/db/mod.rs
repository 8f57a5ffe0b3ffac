//! Database layer for the local cache

mod cache_repository;
mod connection;
mod migrations;
mod predicate;
mod settings_repository;

pub use cache_repository::{CacheRepository, LibSqlCacheRepository};
pub use connection::Database;
pub use predicate::LogPredicate;
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
