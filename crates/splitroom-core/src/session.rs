//! Viewing and editing one room.
//!
//! A [`RoomSession`] holds the logs and balance currently shown for a room.
//! With live backup on, every load also reads the local cache first: a
//! successful fetch queues a reconciliation on the room's [`SyncQueue`],
//! and a failed fetch falls back to showing the cached logs.

use tokio::sync::oneshot;

use crate::api::{LogService, RoomKey};
use crate::db::LogPredicate;
use crate::error::{Error, Result};
use crate::models::{BalanceRecord, LogId, LogRecord, Snapshot};
use crate::services::LocalStore;
use crate::state::SyncState;
use crate::sync::{ReconcileJob, ReconcileReport, SyncQueue};
use crate::util::{format_amount, normalize_text_option};

/// A log prepared for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRow<'a> {
    pub log: &'a LogRecord,
    /// Whether the session's user wrote this log
    pub is_mine: bool,
}

impl DisplayRow<'_> {
    pub fn amount_label(&self) -> String {
        format_amount(i64::from(self.log.amount))
    }

    /// Labelled fields for a detail view: creation date, then memo if any.
    pub fn details(&self) -> Vec<(&'static str, String)> {
        let mut details = vec![("created", self.log.created_at_label())];
        if let Some(memo) = self.log.memo.as_ref().filter(|_| self.log.has_memo()) {
            details.push(("memo", memo.clone()));
        }
        details
    }
}

type CachedState = (Vec<LogRecord>, Option<BalanceRecord>);

/// Logs and balance shown for one room.
///
/// The live-backup flag is read from `queue` on every call, so a
/// [`BackupToggle`](crate::backup::BackupToggle) sharing the same queue
/// takes effect immediately.
pub struct RoomSession<S> {
    room: RoomKey,
    service: S,
    logs: Vec<LogRecord>,
    balance: Option<BalanceRecord>,
    state: SyncState,
    queue: SyncQueue,
    pending: Option<oneshot::Receiver<ReconcileReport>>,
}

impl<S: LogService> RoomSession<S> {
    pub fn new(room: RoomKey, service: S, queue: SyncQueue) -> Self {
        Self {
            room,
            service,
            queue,
            logs: Vec::new(),
            balance: None,
            state: SyncState::default(),
            pending: None,
        }
    }

    pub const fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn logs(&self) -> &[LogRecord] {
        &self.logs
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub const fn balance(&self) -> Option<&BalanceRecord> {
        self.balance.as_ref()
    }

    /// `"<username> <amount>"`, or `"?"` before any balance is known.
    pub fn balance_summary(&self) -> String {
        self.balance
            .as_ref()
            .map_or_else(|| "?".to_string(), BalanceRecord::summary)
    }

    pub const fn sync_state(&self) -> SyncState {
        self.state
    }

    fn backup_enabled(&self) -> bool {
        self.queue.backup().is_enabled()
    }

    const fn store(&self) -> &LocalStore {
        self.queue.store()
    }

    /// Fetch the room and replace the shown logs and balance.
    ///
    /// With backup on, a failed fetch still leaves the cached logs (most
    /// recent first) on display; the fetch error is returned either way.
    pub async fn load_logs(&mut self) -> Result<()> {
        self.state = SyncState::Syncing;

        if !self.backup_enabled() {
            return match self.service.find(&self.room).await {
                Ok(snapshot) => {
                    self.adopt(snapshot);
                    Ok(())
                }
                Err(error) => {
                    tracing::warn!("Loading room {} failed: {}", self.room.room_code, error);
                    self.state = SyncState::Error;
                    Err(error)
                }
            };
        }

        let cached = self.read_cache().await;
        match self.service.find(&self.room).await {
            Ok(snapshot) => {
                if cached.is_some() {
                    self.pending = Some(self.queue.submit(ReconcileJob::full(snapshot.clone())));
                }
                self.adopt(snapshot);
                Ok(())
            }
            Err(error) => {
                if let Some((logs, balance)) = cached {
                    tracing::warn!(
                        "Loading room {} failed, showing {} cached logs: {}",
                        self.room.room_code,
                        logs.len(),
                        error
                    );
                    self.logs = logs;
                    self.balance = balance;
                    self.state = SyncState::Offline;
                } else {
                    tracing::warn!("Loading room {} failed: {}", self.room.room_code, error);
                    self.state = SyncState::Error;
                }
                Err(error)
            }
        }
    }

    /// Wait for the most recently queued reconciliation, if any.
    pub async fn wait_for_sync(&mut self) -> Option<ReconcileReport> {
        let pending = self.pending.take()?;
        pending.await.ok()
    }

    pub fn find_log(&self, index: usize) -> Option<DisplayRow<'_>> {
        self.logs.get(index).map(|log| DisplayRow {
            is_mine: log.username == self.room.username,
            log,
        })
    }

    /// Post a new log. It shows up on the next load.
    pub async fn create_log(&self, amount: i32, memo: Option<String>) -> Result<()> {
        let memo = normalize_text_option(memo);
        self.service
            .create(&self.room, amount, memo.as_deref())
            .await
    }

    /// Change the amount and memo of the log at `index`.
    ///
    /// With backup on, the cached copy is updated too; a cache failure is
    /// logged and does not fail the call.
    pub async fn modify_log(
        &mut self,
        index: usize,
        amount: i32,
        memo: Option<String>,
    ) -> Result<()> {
        let memo = normalize_text_option(memo);
        let log_id = self.log_id_at(index)?;
        self.service
            .modify(&self.room, log_id, amount, memo.as_deref())
            .await?;

        let log = &mut self.logs[index];
        log.amount = amount;
        log.memo = memo;

        if self.queue.backup().is_enabled() {
            if let Err(error) = self.queue.store().modify_log(log).await {
                tracing::warn!("Could not update cached log {}: {}", log_id, error);
            }
        }
        Ok(())
    }

    /// Delete the log at `index` on the server.
    ///
    /// With backup on, the cached copy is removed too; a cache failure is
    /// logged and does not fail the call.
    pub async fn delete_log(&mut self, index: usize) -> Result<()> {
        let log_id = self.log_id_at(index)?;
        self.service.delete(&self.room, log_id).await?;
        self.logs.remove(index);

        if self.backup_enabled() {
            match self.store().delete_logs(&LogPredicate::IdEquals(log_id)).await {
                Ok(removed) => {
                    tracing::debug!("Removed {} cached rows for log {}", removed.len(), log_id);
                }
                Err(error) => {
                    tracing::warn!("Could not remove cached log {}: {}", log_id, error);
                }
            }
        }
        Ok(())
    }

    fn log_id_at(&self, index: usize) -> Result<LogId> {
        self.logs
            .get(index)
            .map(|log| log.id)
            .ok_or_else(|| Error::InvalidInput(format!("no log at index {index}")))
    }

    fn adopt(&mut self, snapshot: Snapshot) {
        self.logs = snapshot.logs;
        self.balance = Some(snapshot.balance);
        self.state = SyncState::Synced;
    }

    async fn read_cache(&self) -> Option<CachedState> {
        let logs = self.store().fetch_logs(&LogPredicate::All).await;
        let balance = self.store().fetch_balance().await;
        match (logs, balance) {
            (Ok(logs), Ok(balance)) => Some((logs, balance)),
            (Err(error), _) | (_, Err(error)) => {
                tracing::warn!("Reading local cache failed: {}", error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupConfig, BackupToggle};
    use crate::testing::{log_at, Call, FakeLogService};
    use pretty_assertions::assert_eq;

    fn room() -> RoomKey {
        RoomKey::new("AB12CD", "mina")
    }

    async fn session(
        service: &FakeLogService,
        backup: bool,
    ) -> (RoomSession<FakeLogService>, LocalStore) {
        let (session, _toggle, store) = session_with_toggle(service, backup).await;
        (session, store)
    }

    /// A session and a backup toggle sharing one room queue.
    async fn session_with_toggle(
        service: &FakeLogService,
        backup: bool,
    ) -> (
        RoomSession<FakeLogService>,
        BackupToggle<FakeLogService>,
        LocalStore,
    ) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let queue = SyncQueue::spawn(store.clone(), BackupConfig::new(backup));
        let session = RoomSession::new(room(), service.clone(), queue.clone());
        let toggle = BackupToggle::new(service.clone(), queue, room());
        (session, toggle, store)
    }

    async fn cached_ids(store: &LocalStore) -> Vec<i64> {
        let mut ids: Vec<i64> = store
            .fetch_logs(&LogPredicate::All)
            .await
            .unwrap()
            .iter()
            .map(|log| log.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_without_backup_uses_server_only() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0), log_at(2, 250, 1)]);
        let (mut session, store) = session(&service, false).await;

        assert_eq!(session.balance_summary(), "?");
        session.load_logs().await.unwrap();

        assert_eq!(session.logs(), &[log_at(1, 100, 0), log_at(2, 250, 1)]);
        assert_eq!(session.balance_summary(), "mina 350");
        assert_eq!(session.sync_state(), SyncState::Synced);
        assert!(session.wait_for_sync().await.is_none());
        assert!(cached_ids(&store).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_load_without_backup_keeps_previous_state() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0)]);
        let (mut session, _store) = session(&service, false).await;
        session.load_logs().await.unwrap();

        service.set_online(false);
        assert!(session.load_logs().await.unwrap_err().is_network());

        assert_eq!(session.logs(), &[log_at(1, 100, 0)]);
        assert_eq!(session.sync_state(), SyncState::Error);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_with_backup_reconciles_cache_in_background() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0), log_at(2, 200, 1)]);
        let (mut session, store) = session(&service, true).await;
        store
            .insert_logs(&[log_at(1, 90, 0), log_at(1, 90, 0), log_at(3, 300, 2)])
            .await
            .unwrap();

        session.load_logs().await.unwrap();
        assert_eq!(session.logs(), &[log_at(1, 100, 0), log_at(2, 200, 1)]);

        let report = session.wait_for_sync().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.deleted, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(cached_ids(&store).await, vec![1, 2]);
        assert_eq!(
            store.fetch_balance().await.unwrap(),
            Some(service.snapshot().balance)
        );

        // A second load over the repaired cache changes nothing.
        session.load_logs().await.unwrap();
        let report = session.wait_for_sync().await.unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_load_with_backup_falls_back_to_cache() {
        let service = FakeLogService::with_logs(vec![]);
        service.set_online(false);
        let (mut session, store) = session(&service, true).await;
        let older = log_at(1, 100, 0);
        let newer = log_at(2, 200, 10);
        store.insert_logs(&[older.clone(), newer.clone()]).await.unwrap();

        let error = session.load_logs().await.unwrap_err();

        assert!(error.is_network());
        assert_eq!(session.logs(), &[newer, older]);
        assert_eq!(session.sync_state(), SyncState::Offline);
        assert!(session.wait_for_sync().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabling_backup_discards_pending_reconciliation() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0), log_at(2, 200, 1)]);
        let (mut session, toggle, store) = session_with_toggle(&service, true).await;

        session.load_logs().await.unwrap();
        toggle.set_backup(false).await.unwrap();

        // Whether the pass ran before the wipe or was skipped after the flag
        // flipped, nothing of it survives.
        let report = session.wait_for_sync().await.unwrap();
        assert!(report.is_success());
        assert!(cached_ids(&store).await.is_empty());
        assert_eq!(store.fetch_balance().await.unwrap(), None);

        // Later loads keep the cache empty while backup stays off.
        session.load_logs().await.unwrap();
        assert!(session.wait_for_sync().await.is_none());
        assert!(cached_ids(&store).await.is_empty());
        assert_eq!(session.logs(), &[log_at(1, 100, 0), log_at(2, 200, 1)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_follows_backup_toggle() {
        let service = FakeLogService::with_logs(vec![
            log_at(1, 100, 0),
            log_at(2, 200, 1),
            log_at(3, 300, 2),
        ]);
        let (mut session, toggle, store) = session_with_toggle(&service, false).await;
        session.load_logs().await.unwrap();
        assert!(cached_ids(&store).await.is_empty());

        toggle.set_backup(true).await.unwrap();
        assert_eq!(cached_ids(&store).await, vec![1, 2, 3]);

        // The flag flipped under the session: deletes are mirrored now.
        session.delete_log(0).await.unwrap();
        assert_eq!(cached_ids(&store).await, vec![2, 3]);

        toggle.set_backup(false).await.unwrap();
        assert!(cached_ids(&store).await.is_empty());

        // And no longer once it is off again.
        store.insert_log(&log_at(2, 200, 1)).await.unwrap();
        session.load_logs().await.unwrap();
        session.delete_log(0).await.unwrap();
        assert_eq!(cached_ids(&store).await, vec![2]);
        assert_eq!(session.logs(), &[log_at(3, 300, 2)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn find_log_is_bounds_checked() {
        let mut other = log_at(2, 500, 1);
        other.username = "joon".to_string();
        let service = FakeLogService::with_logs(vec![log_at(1, 1200, 0), other]);
        let (mut session, _store) = session(&service, false).await;
        session.load_logs().await.unwrap();

        let mine = session.find_log(0).unwrap();
        assert!(mine.is_mine);
        assert_eq!(mine.amount_label(), "1,200");
        assert!(!session.find_log(1).unwrap().is_mine);
        assert!(session.find_log(2).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_with_backup_mirrors_into_cache() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0), log_at(2, 200, 1)]);
        let (mut session, store) = session(&service, true).await;
        session.load_logs().await.unwrap();
        session.wait_for_sync().await.unwrap();
        assert_eq!(cached_ids(&store).await, vec![1, 2]);

        session.delete_log(0).await.unwrap();

        assert_eq!(cached_ids(&store).await, vec![2]);
        assert_eq!(session.logs(), &[log_at(2, 200, 1)]);
        assert!(service.calls().contains(&Call::Delete { log_id: 1 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_without_backup_leaves_cache_alone() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0)]);
        let (mut session, store) = session(&service, false).await;
        store.insert_log(&log_at(1, 100, 0)).await.unwrap();
        session.load_logs().await.unwrap();

        session.delete_log(0).await.unwrap();
        assert_eq!(cached_ids(&store).await, vec![1]);

        // Server rejection leaves the cache alone as well.
        service.set_logs(vec![log_at(1, 100, 0)]);
        session.load_logs().await.unwrap();
        service.set_online(false);
        assert!(session.delete_log(0).await.is_err());
        assert_eq!(cached_ids(&store).await, vec![1]);
        assert_eq!(session.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_server_delete_keeps_cache_with_backup() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0)]);
        let (mut session, store) = session(&service, true).await;
        session.load_logs().await.unwrap();
        session.wait_for_sync().await.unwrap();

        service.set_online(false);
        assert!(session.delete_log(0).await.is_err());
        assert_eq!(cached_ids(&store).await, vec![1]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn out_of_range_delete_never_calls_server() {
        let service = FakeLogService::with_logs(vec![]);
        let (mut session, _store) = session(&service, false).await;

        let error = session.delete_log(3).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn modify_with_backup_updates_cache() {
        let service = FakeLogService::with_logs(vec![log_at(1, 100, 0)]);
        let (mut session, store) = session(&service, true).await;
        session.load_logs().await.unwrap();
        session.wait_for_sync().await.unwrap();

        session
            .modify_log(0, 150, Some("  taxi ".to_string()))
            .await
            .unwrap();

        let mut expected = log_at(1, 150, 0);
        expected.memo = Some("taxi".to_string());
        assert_eq!(session.logs(), &[expected.clone()]);
        assert_eq!(
            store.fetch_logs(&LogPredicate::IdEquals(1)).await.unwrap(),
            vec![expected]
        );
        assert_eq!(
            service.calls().last(),
            Some(&Call::Modify {
                log_id: 1,
                amount: 150,
                memo: Some("taxi".to_string()),
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn created_log_appears_after_reload() {
        let service = FakeLogService::with_logs(vec![]);
        let (mut session, _store) = session(&service, false).await;

        session.create_log(800, Some(" ".to_string())).await.unwrap();
        assert!(session.is_empty());

        session.load_logs().await.unwrap();
        assert_eq!(session.len(), 1);
        let row = session.find_log(0).unwrap();
        assert_eq!(row.log.amount, 800);
        assert_eq!(row.log.memo, None);
        assert_eq!(session.balance_summary(), "mina 800");
    }

    #[test]
    fn details_include_memo_only_when_present() {
        let mut log = log_at(1, 100, 5);
        let row = DisplayRow {
            log: &log,
            is_mine: true,
        };
        assert_eq!(row.details(), vec![("created", "24.07.20 09:05".to_string())]);

        log.memo = Some("dinner".to_string());
        let row = DisplayRow {
            log: &log,
            is_mine: true,
        };
        assert_eq!(
            row.details(),
            vec![
                ("created", "24.07.20 09:05".to_string()),
                ("memo", "dinner".to_string()),
            ]
        );
    }
}
