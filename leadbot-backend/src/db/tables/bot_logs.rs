//! Event log database operations

use chrono::Utc;
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::BotLogEntry;

impl Database {
    pub fn insert_bot_log(&self, entry: &BotLogEntry) -> SqliteResult<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO bot_logs (bot_id, telegram_user_id, update_id, event_type, action, outcome, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                entry.bot_id,
                entry.telegram_user_id,
                entry.update_id,
                entry.event_type.as_str(),
                &entry.action,
                entry.outcome.as_str(),
                entry.error_message,
                &now,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn count_bot_logs(&self, bot_id: i64) -> SqliteResult<i64> {
        let conn = self.conn();

        conn.query_row(
            "SELECT COUNT(*) FROM bot_logs WHERE bot_id = ?1",
            [bot_id],
            |row| row.get(0),
        )
    }
}
