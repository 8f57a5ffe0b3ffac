//! In-memory room service used by unit tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::api::{LogService, RoomKey};
use crate::error::{Error, Result};
use crate::models::{BalanceRecord, LogId, LogRecord, Snapshot};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 20, 9, 0, 0).unwrap()
}

/// A log by `mina` created `minute` minutes after [`base_time`].
pub fn log_at(id: LogId, amount: i32, minute: i64) -> LogRecord {
    LogRecord {
        id,
        amount,
        username: "mina".to_string(),
        memo: None,
        created_at: base_time() + Duration::minutes(minute),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Find,
    Create { amount: i32, memo: Option<String> },
    Modify { log_id: LogId, amount: i32, memo: Option<String> },
    Delete { log_id: LogId },
}

#[derive(Debug)]
struct ServerState {
    logs: Vec<LogRecord>,
    online: bool,
    next_id: LogId,
    calls: Vec<Call>,
}

/// Scriptable stand-in for the room service.
///
/// Mutations change the served log list, and the balance is recomputed as
/// the sum of `mina`'s logs. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeLogService {
    state: Arc<Mutex<ServerState>>,
}

impl FakeLogService {
    pub fn with_logs(logs: Vec<LogRecord>) -> Self {
        let next_id = logs.iter().map(|log| log.id).max().unwrap_or(0) + 1;
        Self {
            state: Arc::new(Mutex::new(ServerState {
                logs,
                online: true,
                next_id,
                calls: Vec::new(),
            })),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.state.lock().unwrap().online = online;
    }

    pub fn set_logs(&self, logs: Vec<LogRecord>) {
        self.state.lock().unwrap().logs = logs;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// What `find` would currently return for `mina`.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().unwrap();
        snapshot_of(&state.logs)
    }

    fn record(&self, call: Call) -> Result<std::sync::MutexGuard<'_, ServerState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.online {
            Ok(state)
        } else {
            Err(Error::Api {
                status: 503,
                message: "service unavailable".to_string(),
            })
        }
    }
}

fn snapshot_of(logs: &[LogRecord]) -> Snapshot {
    let amount = logs
        .iter()
        .filter(|log| log.username == "mina")
        .map(|log| i64::from(log.amount))
        .sum();
    Snapshot {
        balance: BalanceRecord {
            amount,
            username: "mina".to_string(),
        },
        logs: logs.to_vec(),
    }
}

fn not_found(log_id: LogId) -> Error {
    Error::Api {
        status: 404,
        message: format!("log {log_id} not found"),
    }
}

impl LogService for FakeLogService {
    async fn find(&self, _room: &RoomKey) -> Result<Snapshot> {
        let state = self.record(Call::Find)?;
        Ok(snapshot_of(&state.logs))
    }

    async fn create(&self, room: &RoomKey, amount: i32, memo: Option<&str>) -> Result<()> {
        let mut state = self.record(Call::Create {
            amount,
            memo: memo.map(str::to_string),
        })?;
        let id = state.next_id;
        state.next_id += 1;
        let minute = i64::try_from(state.logs.len()).unwrap_or_default();
        state.logs.push(LogRecord {
            id,
            amount,
            username: room.username.clone(),
            memo: memo.map(str::to_string),
            created_at: base_time() + Duration::hours(1) + Duration::minutes(minute),
        });
        Ok(())
    }

    async fn modify(
        &self,
        _room: &RoomKey,
        log_id: LogId,
        amount: i32,
        memo: Option<&str>,
    ) -> Result<()> {
        let mut state = self.record(Call::Modify {
            log_id,
            amount,
            memo: memo.map(str::to_string),
        })?;
        let log = state
            .logs
            .iter_mut()
            .find(|log| log.id == log_id)
            .ok_or_else(|| not_found(log_id))?;
        log.amount = amount;
        log.memo = memo.map(str::to_string);
        Ok(())
    }

    async fn delete(&self, _room: &RoomKey, log_id: LogId) -> Result<()> {
        let mut state = self.record(Call::Delete { log_id })?;
        let before = state.logs.len();
        state.logs.retain(|log| log.id != log_id);
        if state.logs.len() == before {
            return Err(not_found(log_id));
        }
        Ok(())
    }
}
