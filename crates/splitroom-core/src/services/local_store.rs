//! Shared cache service wrapper used by sessions and the backup toggle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    CacheRepository, Database, LibSqlCacheRepository, LibSqlSettingsRepository, LogPredicate,
    SettingsRepository,
};
use crate::models::{BalanceRecord, LogRecord, Settings};
use crate::Result;

/// Thread-safe handle to the local cache.
///
/// Every operation takes the connection lock for its whole duration, so
/// storage calls complete one at a time even when issued concurrently.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the cache at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory cache (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location of the cache, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Fetch cached logs matching `predicate`, most recent first.
    pub async fn fetch_logs(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.fetch_logs(predicate).await
    }

    /// Fetch the cached balance.
    pub async fn fetch_balance(&self) -> Result<Option<BalanceRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.fetch_balance().await
    }

    /// Insert one log.
    pub async fn insert_log(&self, log: &LogRecord) -> Result<()> {
        self.insert_logs(std::slice::from_ref(log)).await
    }

    /// Insert a batch of logs atomically.
    pub async fn insert_logs(&self, logs: &[LogRecord]) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.insert_logs(logs).await
    }

    /// Overwrite one cached log by id.
    pub async fn modify_log(&self, log: &LogRecord) -> Result<()> {
        self.modify_logs(std::slice::from_ref(log)).await
    }

    /// Overwrite a batch of cached logs by id atomically.
    pub async fn modify_logs(&self, logs: &[LogRecord]) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.modify_logs(logs).await
    }

    /// Delete cached logs matching `predicate`.
    pub async fn delete_logs(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.delete_logs(predicate).await
    }

    /// Cache a balance when none is stored.
    pub async fn insert_balance(&self, balance: &BalanceRecord) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.insert_balance(balance).await
    }

    /// Replace the cached balance.
    pub async fn modify_balance(&self, balance: &BalanceRecord) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.modify_balance(balance).await
    }

    /// Delete the cached balance.
    pub async fn delete_balances(&self) -> Result<Vec<BalanceRecord>> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.delete_balances().await
    }

    /// Remove every cached log and balance.
    ///
    /// Both deletions are attempted; the first failure is returned.
    pub async fn clear_cache(&self) -> Result<()> {
        let logs = self.delete_logs(&LogPredicate::All).await;
        let balances = self.delete_balances().await;
        match (logs, balances) {
            (Ok(logs), Ok(balances)) => {
                tracing::info!(
                    "Cleared local cache ({} logs, {} balances)",
                    logs.len(),
                    balances.len()
                );
                Ok(())
            }
            (Err(error), _) | (_, Err(error)) => Err(error),
        }
    }

    /// Load settings.
    pub async fn load_settings(&self) -> Result<Settings> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.load().await
    }

    /// Save settings.
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.save(settings).await
    }

    /// Persist the live-backup flag.
    pub async fn save_live_backup(&self, enabled: bool) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        repo.save_live_backup(enabled).await
    }
}
