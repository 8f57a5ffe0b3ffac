//! Signing in and entering rooms.
//!
//! The username and the last entered room code are kept in settings so the
//! client can reopen the same room on the next start.

use crate::api::{RoomKey, RoomService};
use crate::error::{Error, Result};
use crate::services::LocalStore;
use crate::util::normalize_text_option;

fn required(value: &str, field: &str) -> Result<String> {
    normalize_text_option(Some(value.to_string()))
        .ok_or_else(|| Error::InvalidInput(format!("{field} must not be empty")))
}

/// Remember the username for later sessions.
pub async fn sign_in(store: &LocalStore, username: &str) -> Result<String> {
    let username = required(username, "username")?;
    let mut settings = store.load_settings().await?;
    settings.username = Some(username.clone());
    store.save_settings(&settings).await?;
    Ok(username)
}

/// Open a new room and remember it.
pub async fn create_room<R: RoomService>(
    service: &R,
    store: &LocalStore,
    username: &str,
) -> Result<RoomKey> {
    let username = required(username, "username")?;
    let room_code = service.create_room(&username).await?;
    tracing::info!("Created room {}", room_code);
    remember(store, RoomKey::new(room_code, username)).await
}

/// Join an existing room by code and remember it.
pub async fn join_room<R: RoomService>(
    service: &R,
    store: &LocalStore,
    room_code: &str,
    username: &str,
) -> Result<RoomKey> {
    let room_code = required(room_code, "room code")?;
    let username = required(username, "username")?;
    service.join_room(&room_code, &username).await?;
    tracing::info!("Joined room {}", room_code);
    remember(store, RoomKey::new(room_code, username)).await
}

/// The room entered last, if a username and room code are both saved.
pub async fn saved_room(store: &LocalStore) -> Result<Option<RoomKey>> {
    let settings = store.load_settings().await?;
    Ok(settings
        .room_code
        .zip(settings.username)
        .map(|(room_code, username)| RoomKey::new(room_code, username)))
}

/// Forget the saved room code, keeping the username.
pub async fn leave_room(store: &LocalStore) -> Result<()> {
    let mut settings = store.load_settings().await?;
    settings.room_code = None;
    store.save_settings(&settings).await
}

async fn remember(store: &LocalStore, room: RoomKey) -> Result<RoomKey> {
    let mut settings = store.load_settings().await?;
    settings.username = Some(room.username.clone());
    settings.room_code = Some(room.room_code.clone());
    store.save_settings(&settings).await?;
    Ok(room)
}
