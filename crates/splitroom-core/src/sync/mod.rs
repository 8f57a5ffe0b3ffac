//! Keeping the local cache in line with the room service.

mod queue;
mod reconcile;

pub use queue::{ReconcileJob, SyncQueue};
pub use reconcile::{
    apply_log_plan, plan_balance, reconcile_balance, reconcile_logs, reconcile_snapshot,
    BalanceAction, LogPlan, ReconcileReport,
};

use crate::api::{LogService, RoomKey};
use crate::error::Result;

/// Fetch the room from the server and reconcile the cache against it.
///
/// The pass runs on the room's queue. Only cached logs created at or after
/// the oldest server log are compared, so older history that the server no
/// longer returns is left in place. A server answer without logs leaves the
/// cache untouched.
pub async fn sync_room<S: LogService>(
    service: &S,
    queue: &SyncQueue,
    room: &RoomKey,
) -> Result<ReconcileReport> {
    let snapshot = service.find(room).await?;
    if snapshot.logs.is_empty() {
        tracing::debug!("Room {} has no logs on the server", room.room_code);
    }
    queue.run(ReconcileJob::window(snapshot)).await.into_result()
}
