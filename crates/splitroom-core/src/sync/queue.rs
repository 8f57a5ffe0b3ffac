//! Per-room serialized cache work.
//!
//! One [`SyncQueue`] exists per room and is shared by the session and the
//! backup toggle. Reconciliation passes and the cache wipe run on the same
//! worker, so a wipe always lands after every pass queued before it.

use tokio::sync::{mpsc, oneshot};

use super::reconcile::{reconcile_snapshot, ReconcileReport};
use crate::backup::BackupConfig;
use crate::db::LogPredicate;
use crate::error::Result;
use crate::models::Snapshot;
use crate::services::LocalStore;

/// A server answer and the part of the cache it is compared against.
///
/// The cache is read when the job runs, not when it is queued.
#[derive(Debug, Clone)]
pub struct ReconcileJob {
    pub snapshot: Snapshot,
    pub scope: LogPredicate,
}

impl ReconcileJob {
    /// Compare against every cached log.
    pub const fn full(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            scope: LogPredicate::All,
        }
    }

    /// Compare only against cached logs created at or after the oldest
    /// server log. Older cached history is left in place.
    pub fn window(snapshot: Snapshot) -> Self {
        let scope = snapshot
            .logs
            .iter()
            .map(|log| log.created_at)
            .min()
            .map_or(LogPredicate::All, LogPredicate::CreatedAtOrAfter);
        Self { snapshot, scope }
    }
}

enum Command {
    Reconcile {
        job: ReconcileJob,
        reply: oneshot::Sender<ReconcileReport>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Runs cache work for one room one command at a time, in submission order.
///
/// Clones share the worker. It stops once every clone is dropped and the
/// backlog is drained.
#[derive(Clone)]
pub struct SyncQueue {
    store: LocalStore,
    backup: BackupConfig,
    tx: mpsc::UnboundedSender<Command>,
}

impl SyncQueue {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(store: LocalStore, backup: BackupConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(store.clone(), backup.clone(), rx));
        Self { store, backup, tx }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn backup(&self) -> &BackupConfig {
        &self.backup
    }

    /// Queue a pass without waiting for it.
    ///
    /// The returned receiver resolves with the pass's report; dropping it
    /// does not cancel the pass. A pass that comes up while live backup is
    /// off is skipped.
    pub fn submit(&self, job: ReconcileJob) -> oneshot::Receiver<ReconcileReport> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Reconcile { job, reply }).is_err() {
            tracing::warn!("Sync worker stopped; dropping reconciliation");
        }
        rx
    }

    /// Queue a pass and wait for its report.
    pub async fn run(&self, job: ReconcileJob) -> ReconcileReport {
        match self.submit(job.clone()).await {
            Ok(report) => report,
            Err(_) => {
                tracing::debug!("Sync worker gone; reconciling inline");
                run_job(&self.store, &self.backup, &job).await
            }
        }
    }

    /// Delete every cached log and the balance once all earlier passes
    /// have finished.
    pub async fn clear_cache(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Clear { reply }).is_ok() {
            if let Ok(result) = rx.await {
                return result;
            }
        }
        tracing::debug!("Sync worker gone; clearing cache inline");
        self.store.clear_cache().await
    }
}

async fn run_job(
    store: &LocalStore,
    backup: &BackupConfig,
    job: &ReconcileJob,
) -> ReconcileReport {
    if !backup.is_enabled() {
        tracing::debug!("Live backup is off; skipping reconciliation");
        return ReconcileReport {
            skipped: true,
            ..ReconcileReport::default()
        };
    }
    if job.snapshot.logs.is_empty() {
        return reconcile_snapshot(store, &[], None, &job.snapshot).await;
    }

    let cached = match store.fetch_logs(&job.scope).await {
        Ok(logs) => store.fetch_balance().await.map(|balance| (logs, balance)),
        Err(error) => Err(error),
    };
    match cached {
        Ok((logs, balance)) => {
            reconcile_snapshot(store, &logs, balance.as_ref(), &job.snapshot).await
        }
        Err(error) => {
            tracing::warn!("Reading local cache failed: {}", error);
            ReconcileReport {
                failures: vec![format!("read: {error}")],
                ..ReconcileReport::default()
            }
        }
    }
}

async fn run_worker(
    store: LocalStore,
    backup: BackupConfig,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Reconcile { job, reply } => {
                let report = run_job(&store, &backup, &job).await;
                if !report.is_success() {
                    tracing::warn!("Background reconciliation incomplete: {:?}", report.failures);
                }
                reply.send(report).ok();
            }
            Command::Clear { reply } => {
                let result = store.clear_cache().await;
                if result.is_ok() {
                    tracing::info!("Cleared local cache");
                }
                reply.send(result).ok();
            }
        }
    }
    tracing::debug!("Sync worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BalanceRecord, LogRecord};
    use crate::testing::log_at;
    use pretty_assertions::assert_eq;

    fn snapshot(logs: Vec<LogRecord>) -> Snapshot {
        Snapshot {
            balance: BalanceRecord {
                amount: logs.iter().map(|log| i64::from(log.amount)).sum(),
                username: "mina".to_string(),
            },
            logs,
        }
    }

    async fn queue(enabled: bool) -> (SyncQueue, LocalStore) {
        let store = LocalStore::open_in_memory().await.unwrap();
        (SyncQueue::spawn(store.clone(), BackupConfig::new(enabled)), store)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn jobs_run_in_submission_order() {
        let (queue, store) = queue(true).await;

        let first = queue.submit(ReconcileJob::full(snapshot(vec![log_at(1, 100, 0)])));
        let second = queue.submit(ReconcileJob::full(snapshot(vec![log_at(1, 100, 0)])));

        let first = first.await.unwrap();
        assert_eq!(first.inserted, 1);
        assert!(first.is_success());

        // The second pass reads the cache the first one wrote.
        let second = second.await.unwrap();
        assert!(second.is_noop());
        assert_eq!(
            store.fetch_logs(&LogPredicate::All).await.unwrap(),
            vec![log_at(1, 100, 0)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropped_receiver_still_runs_job() {
        let (queue, store) = queue(true).await;

        drop(queue.submit(ReconcileJob::full(snapshot(vec![log_at(7, 700, 0)]))));
        let report = queue.run(ReconcileJob::full(snapshot(vec![]))).await;
        assert!(report.is_noop());

        assert_eq!(
            store.fetch_logs(&LogPredicate::All).await.unwrap(),
            vec![log_at(7, 700, 0)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn passes_are_skipped_while_backup_is_off() {
        let (queue, store) = queue(false).await;

        let report = queue
            .run(ReconcileJob::full(snapshot(vec![log_at(1, 100, 0)])))
            .await;

        assert!(report.skipped);
        assert!(report.is_noop());
        assert!(store.fetch_logs(&LogPredicate::All).await.unwrap().is_empty());
        assert_eq!(store.fetch_balance().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_waits_for_queued_passes() {
        let (queue, store) = queue(true).await;

        let pending = queue.submit(ReconcileJob::full(snapshot(vec![
            log_at(1, 100, 0),
            log_at(2, 200, 1),
        ])));
        queue.clear_cache().await.unwrap();

        assert_eq!(pending.await.unwrap().inserted, 2);
        assert!(store.fetch_logs(&LogPredicate::All).await.unwrap().is_empty());
        assert_eq!(store.fetch_balance().await.unwrap(), None);
    }

    #[test]
    fn window_scope_starts_at_oldest_server_log() {
        let job = ReconcileJob::window(snapshot(vec![log_at(2, 200, 10), log_at(1, 100, 3)]));
        assert_eq!(
            job.scope,
            LogPredicate::CreatedAtOrAfter(log_at(1, 100, 3).created_at)
        );
        assert_eq!(ReconcileJob::window(snapshot(vec![])).scope, LogPredicate::All);
    }
}
