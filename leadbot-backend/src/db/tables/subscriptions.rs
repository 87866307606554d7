//! Gate check audit trail database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::SubscriptionCheck;

impl Database {
    /// Append one gate evaluation. Only fresh upstream evaluations are
    /// recorded, never cache hits.
    pub fn insert_subscription_check(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
        channel_id: i64,
        channel_username: Option<&str>,
        is_subscribed: bool,
    ) -> SqliteResult<i64> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO bot_subscriptions (bot_id, telegram_user_id, channel_id, channel_username, is_subscribed, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                bot_id,
                telegram_user_id,
                channel_id,
                channel_username,
                if is_subscribed { 1 } else { 0 },
                &now,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn count_subscription_checks(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
    ) -> SqliteResult<i64> {
        let conn = self.conn();

        conn.query_row(
            "SELECT COUNT(*) FROM bot_subscriptions WHERE bot_id = ?1 AND telegram_user_id = ?2",
            [bot_id, telegram_user_id],
            |row| row.get(0),
        )
    }

    pub fn list_subscription_checks(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
    ) -> SqliteResult<Vec<SubscriptionCheck>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT id, bot_id, telegram_user_id, channel_id, channel_username, is_subscribed, checked_at
             FROM bot_subscriptions WHERE bot_id = ?1 AND telegram_user_id = ?2 ORDER BY id",
        )?;

        let checks = stmt
            .query_map([bot_id, telegram_user_id], |row| {
                let checked_at_str: String = row.get(6)?;
                Ok(SubscriptionCheck {
                    id: row.get(0)?,
                    bot_id: row.get(1)?,
                    telegram_user_id: row.get(2)?,
                    channel_id: row.get(3)?,
                    channel_username: row.get(4)?,
                    is_subscribed: row.get::<_, i32>(5)? != 0,
                    checked_at: DateTime::parse_from_rfc3339(&checked_at_str)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(checks)
    }
}
