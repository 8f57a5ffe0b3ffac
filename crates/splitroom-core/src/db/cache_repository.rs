//! Log and balance cache repository

use crate::error::{Error, Result};
use crate::models::{BalanceRecord, LogRecord};
use libsql::{params_from_iter, Connection, Row, Value};

use super::predicate::{nanos_to_timestamp, timestamp_to_nanos, LogPredicate};

const LOG_COLUMNS: &str = "id, amount, username, memo, created_at";

/// Trait for cached log and balance storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CacheRepository {
    /// Fetch logs matching the predicate, most recent first
    async fn fetch_logs(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>>;

    /// Insert logs in a single transaction
    async fn insert_logs(&self, logs: &[LogRecord]) -> Result<()>;

    /// Overwrite every cached row that shares an id with one of `logs`
    async fn modify_logs(&self, logs: &[LogRecord]) -> Result<()>;

    /// Delete logs matching the predicate, returning the removed rows
    async fn delete_logs(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>>;

    /// Fetch the cached balance, if any
    async fn fetch_balance(&self) -> Result<Option<BalanceRecord>>;

    /// Cache a balance when none is stored yet
    async fn insert_balance(&self, balance: &BalanceRecord) -> Result<()>;

    /// Replace the cached balance in place
    async fn modify_balance(&self, balance: &BalanceRecord) -> Result<()>;

    /// Delete the cached balance, returning what was removed
    async fn delete_balances(&self) -> Result<Vec<BalanceRecord>>;
}

/// libSQL implementation of `CacheRepository`
pub struct LibSqlCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a log from a database row
    fn parse_log(row: &Row) -> Result<LogRecord> {
        let amount: i64 = row.get(1)?;
        let memo = match row.get_value(3)? {
            Value::Text(memo) => Some(memo),
            Value::Null => None,
            other => {
                return Err(Error::Database(format!(
                    "unexpected memo column value: {other:?}"
                )))
            }
        };
        Ok(LogRecord {
            id: row.get(0)?,
            amount: i32::try_from(amount)
                .map_err(|_| Error::Database(format!("amount out of range: {amount}")))?,
            username: row.get(2)?,
            memo,
            created_at: nanos_to_timestamp(row.get(4)?),
        })
    }

    /// Parse a balance from a database row
    fn parse_balance(row: &Row) -> Result<BalanceRecord> {
        Ok(BalanceRecord {
            amount: row.get(0)?,
            username: row.get(1)?,
        })
    }

    fn log_values(log: &LogRecord) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Integer(i64::from(log.amount)),
            Value::Text(log.username.clone()),
            log.memo.clone().map_or(Value::Null, Value::Text),
            Value::Integer(timestamp_to_nanos(&log.created_at)?),
        ])
    }

    async fn query_logs(&self, sql: &str, values: Vec<Value>) -> Result<Vec<LogRecord>> {
        let mut rows = self.conn.query(sql, params_from_iter(values)).await?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            logs.push(Self::parse_log(&row)?);
        }
        Ok(logs)
    }

    async fn insert_logs_unchecked(&self, logs: &[LogRecord]) -> Result<()> {
        for log in logs {
            let mut values = vec![Value::Integer(log.id)];
            values.extend(Self::log_values(log)?);
            self.conn
                .execute(
                    "INSERT INTO logs (id, amount, username, memo, created_at) VALUES (?, ?, ?, ?, ?)",
                    params_from_iter(values),
                )
                .await?;
        }
        Ok(())
    }

    async fn modify_logs_unchecked(&self, logs: &[LogRecord]) -> Result<()> {
        for log in logs {
            let mut values = Self::log_values(log)?;
            values.push(Value::Integer(log.id));
            let rows = self
                .conn
                .execute(
                    "UPDATE logs SET amount = ?, username = ?, memo = ?, created_at = ? WHERE id = ?",
                    params_from_iter(values),
                )
                .await?;
            if rows == 0 {
                return Err(Error::NotFound(format!("log {}", log.id)));
            }
        }
        Ok(())
    }

    async fn delete_logs_unchecked(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>> {
        let mut removed = Vec::new();
        for batch in predicate.batches() {
            let (clause, values) = batch.to_sql()?;
            removed.extend(
                self.query_logs(
                    &format!("SELECT {LOG_COLUMNS} FROM logs {clause}"),
                    values.clone(),
                )
                .await?,
            );
            self.conn
                .execute(
                    &format!("DELETE FROM logs {clause}"),
                    params_from_iter(values),
                )
                .await?;
        }
        Ok(removed)
    }

    async fn begin(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(())
    }

    /// Commit on success, roll back on failure
    async fn finish<T>(&self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                if let Err(e) = self.conn.execute("COMMIT", ()).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }
}

impl CacheRepository for LibSqlCacheRepository<'_> {
    async fn fetch_logs(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>> {
        let batches = predicate.batches();
        let mut logs = Vec::new();
        for batch in &batches {
            let (clause, values) = batch.to_sql()?;
            logs.extend(
                self.query_logs(
                    &format!(
                        "SELECT {LOG_COLUMNS} FROM logs {clause} ORDER BY created_at DESC, row_id DESC"
                    ),
                    values,
                )
                .await?,
            );
        }
        if batches.len() > 1 {
            logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(logs)
    }

    async fn insert_logs(&self, logs: &[LogRecord]) -> Result<()> {
        if logs.is_empty() {
            return Ok(());
        }
        self.begin().await?;
        let outcome = self.insert_logs_unchecked(logs).await;
        self.finish(outcome).await
    }

    async fn modify_logs(&self, logs: &[LogRecord]) -> Result<()> {
        if logs.is_empty() {
            return Ok(());
        }
        self.begin().await?;
        let outcome = self.modify_logs_unchecked(logs).await;
        self.finish(outcome).await
    }

    async fn delete_logs(&self, predicate: &LogPredicate) -> Result<Vec<LogRecord>> {
        self.begin().await?;
        let outcome = self.delete_logs_unchecked(predicate).await;
        self.finish(outcome).await
    }

    async fn fetch_balance(&self) -> Result<Option<BalanceRecord>> {
        let mut rows = self
            .conn
            .query("SELECT amount, username FROM balance WHERE slot = 1", ())
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_balance(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_balance(&self, balance: &BalanceRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO balance (slot, amount, username) VALUES (1, ?, ?)",
                params_from_iter(vec![
                    Value::Integer(balance.amount),
                    Value::Text(balance.username.clone()),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn modify_balance(&self, balance: &BalanceRecord) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE balance SET amount = ?, username = ? WHERE slot = 1",
                params_from_iter(vec![
                    Value::Integer(balance.amount),
                    Value::Text(balance.username.clone()),
                ]),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("balance for {}", balance.username)));
        }
        Ok(())
    }

    async fn delete_balances(&self) -> Result<Vec<BalanceRecord>> {
        let removed: Vec<BalanceRecord> = self.fetch_balance().await?.into_iter().collect();
        self.conn.execute("DELETE FROM balance", ()).await?;
        Ok(removed)
    }
}
