//! Room service contracts and the HTTP client implementing them.

mod http;

pub use http::HttpRoomClient;

use crate::models::{LogId, Snapshot};
use crate::Result;

/// Identifies whose view of which room a request is made for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub room_code: String,
    pub username: String,
}

impl RoomKey {
    pub fn new(room_code: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            username: username.into(),
        }
    }
}

/// Remote log operations.
///
/// Mutations resolve to `Ok(())` only on a 2xx answer.
#[allow(async_fn_in_trait)]
pub trait LogService {
    /// Fetch the caller's balance and every log in the room.
    async fn find(&self, room: &RoomKey) -> Result<Snapshot>;

    /// Post a new log.
    async fn create(&self, room: &RoomKey, amount: i32, memo: Option<&str>) -> Result<()>;

    /// Change the amount and memo of an existing log.
    async fn modify(
        &self,
        room: &RoomKey,
        log_id: LogId,
        amount: i32,
        memo: Option<&str>,
    ) -> Result<()>;

    /// Delete a log.
    async fn delete(&self, room: &RoomKey, log_id: LogId) -> Result<()>;
}

/// Remote room membership operations.
#[allow(async_fn_in_trait)]
pub trait RoomService {
    /// Open a new room owned by `username`, returning its code.
    async fn create_room(&self, username: &str) -> Result<String>;

    /// Join an existing room by code.
    async fn join_room(&self, room_code: &str, username: &str) -> Result<()>;
}
