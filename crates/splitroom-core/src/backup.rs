//! Live-backup flag and its on/off transitions.
//!
//! [`BackupConfig`] is the observable flag shared by sessions and the UI.
//! [`BackupToggle`] owns the side effects of flipping it: a full sync when
//! backup is turned on and a cache wipe when it is turned off. Both go
//! through the room's [`SyncQueue`], so a wipe lands after every pass that
//! was queued before it.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{LogService, RoomKey};
use crate::db::LogPredicate;
use crate::error::Result;
use crate::services::LocalStore;
use crate::sync::{sync_room, ReconcileReport, SyncQueue};

/// Shared live-backup flag with change notification.
///
/// Clones observe and update the same flag.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    tx: Arc<watch::Sender<bool>>,
}

impl BackupConfig {
    pub fn new(enabled: bool) -> Self {
        let (tx, _rx) = watch::channel(enabled);
        Self { tx: Arc::new(tx) }
    }

    /// Restore the flag persisted in settings.
    pub async fn load(store: &LocalStore) -> Result<Self> {
        let settings = store.load_settings().await?;
        Ok(Self::new(settings.live_backup))
    }

    pub fn is_enabled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver that yields every change of the flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Update the flag, notifying observers only on an actual change.
    fn set(&self, enabled: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == enabled {
                false
            } else {
                *current = enabled;
                true
            }
        })
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self::new(false)
    }
}

/// What to do with the flag when the sync that follows enabling fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnableFailurePolicy {
    /// Leave backup on; the next successful load repairs the cache
    #[default]
    KeepEnabled,
    /// Turn backup back off and notify observers of the correction
    RollBack,
}

/// Flips live backup for one room and performs the transition side effects.
///
/// The flag it flips is the one carried by `queue`.
pub struct BackupToggle<S> {
    service: S,
    queue: SyncQueue,
    room: RoomKey,
    policy: EnableFailurePolicy,
}

impl<S: LogService> BackupToggle<S> {
    pub fn new(service: S, queue: SyncQueue, room: RoomKey) -> Self {
        Self {
            service,
            queue,
            room,
            policy: EnableFailurePolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_failure_policy(mut self, policy: EnableFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn config(&self) -> &BackupConfig {
        self.queue.backup()
    }

    const fn store(&self) -> &LocalStore {
        self.queue.store()
    }

    /// Turn live backup on or off.
    ///
    /// Enabling persists the flag and then syncs the room into the cache;
    /// the sync result is returned. Disabling persists the flag and wipes
    /// cached logs and balance once queued passes have finished.
    pub async fn set_backup(&self, enabled: bool) -> Result<()> {
        if enabled {
            self.enable().await.map(|_| ())
        } else {
            self.disable().await
        }
    }

    async fn enable(&self) -> Result<ReconcileReport> {
        self.store().save_live_backup(true).await?;
        self.config().set(true);

        match sync_room(&self.service, &self.queue, &self.room).await {
            Ok(report) => {
                tracing::info!(
                    "Live backup enabled for room {} ({} logs inserted)",
                    self.room.room_code,
                    report.inserted
                );
                Ok(report)
            }
            Err(error) => {
                tracing::warn!("Initial backup sync failed: {}", error);
                if self.policy == EnableFailurePolicy::RollBack {
                    if let Err(persist_error) = self.store().save_live_backup(false).await {
                        tracing::warn!("Could not persist backup rollback: {}", persist_error);
                    }
                    self.config().set(false);
                }
                Err(error)
            }
        }
    }

    async fn disable(&self) -> Result<()> {
        self.store().save_live_backup(false).await?;
        // Passes that come up after this point are skipped by the worker.
        self.config().set(false);
        self.queue.clear_cache().await
    }

    /// Delete every cached log, leaving the flag and balance alone.
    pub async fn clear_logs(&self) -> Result<usize> {
        let removed = self.store().delete_logs(&LogPredicate::All).await?;
        tracing::info!("Cleared {} cached logs", removed.len());
        Ok(removed.len())
    }
}
