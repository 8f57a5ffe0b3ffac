//! Settings repository implementation

use crate::error::Result;
use crate::models::Settings;
use libsql::Connection;

const USERNAME_KEY: &str = "username";
const ROOM_CODE_KEY: &str = "room_code";
const LIVE_BACKUP_KEY: &str = "live_backup";

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Load settings from the database
    async fn load(&self) -> Result<Settings>;

    /// Save settings to the database
    async fn save(&self, settings: &Settings) -> Result<()>;

    /// Persist only the live-backup flag
    async fn save_live_backup(&self, enabled: bool) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load(&self) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(value) = self.get_setting(USERNAME_KEY).await? {
            settings.username = Some(value);
        }

        if let Some(value) = self.get_setting(ROOM_CODE_KEY).await? {
            settings.room_code = Some(value);
        }

        if let Some(value) = self.get_setting(LIVE_BACKUP_KEY).await? {
            settings.live_backup = parse_flag(&value);
        }

        Ok(settings)
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        match settings.username.as_deref() {
            Some(username) => self.set_setting(USERNAME_KEY, username).await?,
            None => self.remove_setting(USERNAME_KEY).await?,
        }
        match settings.room_code.as_deref() {
            Some(room_code) => self.set_setting(ROOM_CODE_KEY, room_code).await?,
            None => self.remove_setting(ROOM_CODE_KEY).await?,
        }
        self.save_live_backup(settings.live_backup).await
    }

    async fn save_live_backup(&self, enabled: bool) -> Result<()> {
        self.set_setting(LIVE_BACKUP_KEY, if enabled { "true" } else { "false" })
            .await
    }
}

impl LibSqlSettingsRepository<'_> {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", [key])
            .await?;
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
