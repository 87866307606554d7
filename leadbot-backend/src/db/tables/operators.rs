//! Staff operator database operations

use chrono::Utc;
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::StaffOperator;

impl Database {
    pub fn create_staff_operator(
        &self,
        name: Option<&str>,
        handle: Option<&str>,
    ) -> SqliteResult<StaffOperator> {
        let conn = self.conn();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO staff_operators (name, handle, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, handle, &now.to_rfc3339()],
        )?;

        Ok(StaffOperator {
            id: conn.last_insert_rowid(),
            name: name.map(|s| s.to_string()),
            handle: handle.map(|s| s.to_string()),
            created_at: now,
        })
    }

    /// Chat ids of operators who have talked to any bot, matched by handle
    /// against session usernames. Handles are matched case-insensitively with
    /// a leading `@` ignored.
    pub fn operator_linked_chat_ids(&self) -> SqliteResult<Vec<i64>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT DISTINCT bu.telegram_user_id
             FROM bot_users bu
             JOIN staff_operators so
               ON LOWER(LTRIM(so.handle, '@')) = LOWER(bu.username)
             WHERE so.handle IS NOT NULL AND bu.username IS NOT NULL",
        )?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(ids)
    }
}
