//! Filters for log queries and deletes

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use libsql::Value;

use crate::error::{Error, Result};
use crate::models::LogId;

/// Most ids bound into a single statement. SQLite limits bound parameters
/// per statement (999 on older builds).
pub(crate) const MAX_BOUND_IDS: usize = 500;

/// Row filter understood by the log cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPredicate {
    /// Every cached log
    All,
    /// Rows carrying exactly this id (duplicates included)
    IdEquals(LogId),
    /// Rows whose id is in the set; an empty set matches nothing
    IdIn(BTreeSet<LogId>),
    /// Rows created at or after the given instant
    CreatedAtOrAfter(DateTime<Utc>),
}

impl LogPredicate {
    /// Build an `IdIn` predicate from any id iterator.
    pub fn id_in(ids: impl IntoIterator<Item = LogId>) -> Self {
        Self::IdIn(ids.into_iter().collect())
    }

    /// Split an `IdIn` set into pieces of at most [`MAX_BOUND_IDS`] ids.
    ///
    /// Other predicates come back unchanged as a single batch.
    pub(crate) fn batches(&self) -> Vec<Self> {
        match self {
            Self::IdIn(ids) if ids.len() > MAX_BOUND_IDS => {
                let ids: Vec<LogId> = ids.iter().copied().collect();
                ids.chunks(MAX_BOUND_IDS)
                    .map(|chunk| Self::id_in(chunk.iter().copied()))
                    .collect()
            }
            other => vec![other.clone()],
        }
    }

    /// Render the predicate as a `WHERE` clause plus positional parameters.
    pub(crate) fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        match self {
            Self::All => Ok((String::new(), Vec::new())),
            Self::IdEquals(id) => Ok(("WHERE id = ?".to_string(), vec![Value::Integer(*id)])),
            Self::IdIn(ids) if ids.is_empty() => Ok(("WHERE 0".to_string(), Vec::new())),
            Self::IdIn(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let values = ids.iter().map(|id| Value::Integer(*id)).collect();
                Ok((format!("WHERE id IN ({placeholders})"), values))
            }
            Self::CreatedAtOrAfter(instant) => Ok((
                "WHERE created_at >= ?".to_string(),
                vec![Value::Integer(timestamp_to_nanos(instant)?)],
            )),
        }
    }
}

/// Encode a timestamp as nanoseconds since the Unix epoch.
pub(crate) fn timestamp_to_nanos(instant: &DateTime<Utc>) -> Result<i64> {
    instant.timestamp_nanos_opt().ok_or_else(|| {
        Error::InvalidInput(format!("timestamp out of storable range: {instant}"))
    })
}

/// Decode nanoseconds since the Unix epoch.
pub(crate) fn nanos_to_timestamp(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
