//! Reconciliation of the local cache against a server snapshot.
//!
//! # Algorithm
//!
//! 1. Ids cached more than once, and ids the server no longer lists, are
//!    deleted with a single `id IN (...)` delete. A failed delete aborts the
//!    pass.
//! 2. Server logs with no cached row for their id are inserted in one batch.
//! 3. Server logs whose cached row differs in any field are written back in
//!    one batch modify.
//!
//! Insert and modify are both attempted even if one of them fails. Running
//! the same pass twice leaves the cache unchanged the second time.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::db::LogPredicate;
use crate::error::{Error, Result};
use crate::models::{BalanceRecord, LogId, LogRecord, Snapshot};
use crate::services::LocalStore;

/// Mutations needed to turn a cached log set into the server's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPlan {
    /// Duplicated or server-deleted ids, removed before anything else
    pub stale_ids: BTreeSet<LogId>,
    /// Server logs with no surviving cached row
    pub inserts: Vec<LogRecord>,
    /// Server versions of logs whose cached row differs
    pub modifies: Vec<LogRecord>,
}

impl LogPlan {
    /// Diff `cached` against the authoritative `server` set.
    pub fn between(cached: &[LogRecord], server: &[LogRecord]) -> Self {
        let mut counts: HashMap<LogId, usize> = HashMap::new();
        for log in cached {
            *counts.entry(log.id).or_default() += 1;
        }

        let server_ids: HashSet<LogId> = server.iter().map(|log| log.id).collect();
        let stale_ids: BTreeSet<LogId> = counts
            .iter()
            .filter(|(id, count)| **count > 1 || !server_ids.contains(*id))
            .map(|(id, _)| *id)
            .collect();

        let survivors: HashMap<LogId, &LogRecord> = cached
            .iter()
            .filter(|log| !stale_ids.contains(&log.id))
            .map(|log| (log.id, log))
            .collect();

        let mut inserts = Vec::new();
        let mut modifies = Vec::new();
        let mut seen = HashSet::new();
        for log in server {
            if !seen.insert(log.id) {
                tracing::warn!("Server listed log {} more than once; keeping the first", log.id);
                continue;
            }
            match survivors.get(&log.id) {
                None => inserts.push(log.clone()),
                Some(cached) if *cached != log => modifies.push(log.clone()),
                Some(_) => {}
            }
        }

        Self {
            stale_ids,
            inserts,
            modifies,
        }
    }

    /// Whether applying the plan would touch the cache at all.
    pub fn is_empty(&self) -> bool {
        self.stale_ids.is_empty() && self.inserts.is_empty() && self.modifies.is_empty()
    }
}

/// What balance reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceAction {
    /// No balance was cached; the server copy was inserted
    Inserted,
    /// The cached balance differed and was replaced
    Modified,
    /// The cached balance already matched
    Unchanged,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub inserted: usize,
    pub modified: usize,
    pub balance: Option<BalanceAction>,
    /// One entry per failed step
    pub failures: Vec<String>,
    /// Live backup was off when the pass came up, so nothing ran
    pub skipped: bool,
}

impl ReconcileReport {
    /// Every attempted step succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Nothing was written to the cache.
    pub fn is_noop(&self) -> bool {
        self.deleted == 0
            && self.inserted == 0
            && self.modified == 0
            && matches!(self.balance, None | Some(BalanceAction::Unchanged))
    }

    /// Convert failed steps into `Error::Reconcile`.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Reconcile(self.failures.join("; ")))
        }
    }
}

/// Apply a log plan to the cache.
///
/// Returns `Err` only when the stale-row delete fails; insert and modify
/// failures are recorded in the report.
pub async fn apply_log_plan(store: &LocalStore, plan: &LogPlan) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    if !plan.stale_ids.is_empty() {
        let removed = store
            .delete_logs(&LogPredicate::IdIn(plan.stale_ids.clone()))
            .await
            .inspect_err(|error| {
                tracing::error!("Aborting reconciliation, stale log delete failed: {}", error);
            })?;
        report.deleted = removed.len();
    }

    if !plan.inserts.is_empty() {
        match store.insert_logs(&plan.inserts).await {
            Ok(()) => report.inserted = plan.inserts.len(),
            Err(error) => {
                tracing::warn!("Inserting {} logs failed: {}", plan.inserts.len(), error);
                report.failures.push(format!("insert: {error}"));
            }
        }
    }

    if !plan.modifies.is_empty() {
        match store.modify_logs(&plan.modifies).await {
            Ok(()) => report.modified = plan.modifies.len(),
            Err(error) => {
                tracing::warn!("Modifying {} logs failed: {}", plan.modifies.len(), error);
                report.failures.push(format!("modify: {error}"));
            }
        }
    }

    Ok(report)
}

/// Reconcile cached logs against the server's log list.
///
/// An empty server list is treated as nothing to reconcile against.
pub async fn reconcile_logs(
    store: &LocalStore,
    cached: &[LogRecord],
    server: &[LogRecord],
) -> Result<ReconcileReport> {
    if server.is_empty() {
        tracing::debug!("Server returned no logs; skipping log reconciliation");
        return Ok(ReconcileReport::default());
    }

    let plan = LogPlan::between(cached, server);
    tracing::debug!(
        "Reconcile plan: {} stale ids, {} inserts, {} modifies",
        plan.stale_ids.len(),
        plan.inserts.len(),
        plan.modifies.len()
    );
    if plan.is_empty() {
        return Ok(ReconcileReport::default());
    }
    apply_log_plan(store, &plan).await
}

/// Decide how the cached balance must change to match the server.
pub fn plan_balance(cached: Option<&BalanceRecord>, server: &BalanceRecord) -> BalanceAction {
    match cached {
        None => BalanceAction::Inserted,
        Some(cached) if cached != server => BalanceAction::Modified,
        Some(_) => BalanceAction::Unchanged,
    }
}

/// Bring the cached balance in line with the server copy.
pub async fn reconcile_balance(
    store: &LocalStore,
    cached: Option<&BalanceRecord>,
    server: &BalanceRecord,
) -> Result<BalanceAction> {
    let action = plan_balance(cached, server);
    match action {
        BalanceAction::Inserted => store.insert_balance(server).await?,
        BalanceAction::Modified => store.modify_balance(server).await?,
        BalanceAction::Unchanged => {}
    }
    Ok(action)
}

/// Reconcile logs, then balance, against one server snapshot.
///
/// The two steps are independent: a failed log pass does not stop the
/// balance from being written. Failures are collected in the report.
pub async fn reconcile_snapshot(
    store: &LocalStore,
    cached_logs: &[LogRecord],
    cached_balance: Option<&BalanceRecord>,
    snapshot: &Snapshot,
) -> ReconcileReport {
    if snapshot.logs.is_empty() {
        tracing::debug!("Server snapshot has no logs; leaving cache untouched");
        return ReconcileReport::default();
    }

    let mut report = match reconcile_logs(store, cached_logs, &snapshot.logs).await {
        Ok(report) => report,
        Err(error) => ReconcileReport {
            failures: vec![format!("delete: {error}")],
            ..ReconcileReport::default()
        },
    };

    match reconcile_balance(store, cached_balance, &snapshot.balance).await {
        Ok(action) => report.balance = Some(action),
        Err(error) => {
            tracing::warn!("Balance reconciliation failed: {}", error);
            report.failures.push(format!("balance: {error}"));
        }
    }

    if report.is_success() {
        tracing::info!(
            "Reconciled cache: {} deleted, {} inserted, {} modified, balance {:?}",
            report.deleted,
            report.inserted,
            report.modified,
            report.balance
        );
    }
    report
}
