//! Bot registry database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::{Bot, BotSettings};

fn bot_from_row(row: &rusqlite::Row) -> rusqlite::Result<Bot> {
    let operator_ids_json: String = row.get(10)?;
    let settings_raw: Option<String> = row.get(12)?;
    let created_at_str: String = row.get(13)?;
    let updated_at_str: String = row.get(14)?;

    Ok(Bot {
        id: row.get(0)?,
        name: row.get(1)?,
        token: row.get(2)?,
        username: row.get(3)?,
        enabled: row.get::<_, i32>(4)? != 0,
        webhook_url: row.get(5)?,
        webhook_registered: row.get::<_, i32>(6)? != 0,
        welcome_message: row.get(7)?,
        required_channel_id: row.get(8)?,
        required_channel_username: row.get(9)?,
        operator_chat_ids: serde_json::from_str(&operator_ids_json).unwrap_or_default(),
        review_url: row.get(11)?,
        settings: BotSettings::parse(settings_raw.as_deref()),
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const BOT_COLUMNS: &str = "id, name, token, username, enabled, webhook_url, webhook_registered, \
     welcome_message, required_channel_id, required_channel_username, operator_chat_ids, \
     review_url, settings, created_at, updated_at";

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn create_bot(
        &self,
        name: &str,
        token: &str,
        username: Option<&str>,
        required_channel_id: Option<i64>,
        required_channel_username: Option<&str>,
        operator_chat_ids: &[i64],
        settings_json: Option<&str>,
    ) -> SqliteResult<Bot> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let operator_ids_json =
            serde_json::to_string(operator_chat_ids).unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "INSERT INTO bots (name, token, username, enabled, required_channel_id, required_channel_username, operator_chat_ids, settings, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                name,
                token,
                username,
                required_channel_id,
                required_channel_username,
                &operator_ids_json,
                settings_json,
                &now,
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_bot(id).map(|opt| opt.unwrap())
    }

    pub fn get_bot(&self, id: i64) -> SqliteResult<Option<Bot>> {
        let conn = self.conn();

        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM bots WHERE id = ?1", BOT_COLUMNS))?;

        let bot = stmt.query_row([id], bot_from_row).ok();

        Ok(bot)
    }

    pub fn list_active_bots(&self) -> SqliteResult<Vec<Bot>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bots WHERE enabled = 1 ORDER BY id",
            BOT_COLUMNS
        ))?;

        let bots = stmt
            .query_map([], bot_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(bots)
    }

    pub fn set_bot_enabled(&self, id: i64, enabled: bool) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bots SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![if enabled { 1 } else { 0 }, &now, id],
        )?;

        Ok(rows_affected > 0)
    }

    /// Record the outcome of a webhook register/remove call.
    pub fn set_bot_webhook(
        &self,
        id: i64,
        webhook_url: Option<&str>,
        registered: bool,
    ) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bots SET webhook_url = ?1, webhook_registered = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![webhook_url, if registered { 1 } else { 0 }, &now, id],
        )?;

        Ok(rows_affected > 0)
    }
}
