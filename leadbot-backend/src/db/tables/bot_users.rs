//! Conversation session database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::{BotUser, ConversationState, SessionScratch, UserProfile};

fn bot_user_from_row(row: &rusqlite::Row) -> rusqlite::Result<BotUser> {
    let checked_at_str: Option<String> = row.get(8)?;
    let scratch_json: String = row.get(10)?;
    let last_interaction_str: String = row.get(11)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;

    Ok(BotUser {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        telegram_user_id: row.get(2)?,
        username: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        language_code: row.get(6)?,
        is_subscribed: row.get::<_, i32>(7)? != 0,
        subscription_checked_at: checked_at_str.map(|s| {
            DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)
        }),
        current_state: row.get(9)?,
        scratch: SessionScratch::from_json(&scratch_json),
        last_interaction_at: Some(
            DateTime::parse_from_rfc3339(&last_interaction_str)
                .unwrap()
                .with_timezone(&Utc),
        ),
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const BOT_USER_COLUMNS: &str = "id, bot_id, telegram_user_id, username, first_name, last_name, \
     language_code, is_subscribed, subscription_checked_at, current_state, state_data, \
     last_interaction_at, created_at, updated_at";

impl Database {
    /// Get the session for this (bot, user) pair, creating it in `idle` if it
    /// does not exist. Profile fields are refreshed from the incoming update
    /// on every call.
    pub fn get_or_create_bot_user(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
        profile: &UserProfile,
    ) -> SqliteResult<BotUser> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let existing_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM bot_users WHERE bot_id = ?1 AND telegram_user_id = ?2",
                [bot_id, telegram_user_id],
                |row| row.get(0),
            )
            .ok();

        if let Some(id) = existing_id {
            conn.execute(
                "UPDATE bot_users SET username = ?1, first_name = ?2, last_name = ?3, language_code = ?4,
                 last_interaction_at = ?5, updated_at = ?5 WHERE id = ?6",
                rusqlite::params![
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    profile.language_code,
                    &now,
                    id,
                ],
            )?;
        } else {
            conn.execute(
                "INSERT INTO bot_users (bot_id, telegram_user_id, username, first_name, last_name, language_code,
                 current_state, state_data, last_interaction_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'idle', '{}', ?7, ?7, ?7)",
                rusqlite::params![
                    bot_id,
                    telegram_user_id,
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    profile.language_code,
                    &now,
                ],
            )?;
        }

        drop(conn);

        self.get_bot_user(bot_id, telegram_user_id)
            .map(|opt| opt.unwrap())
    }

    pub fn get_bot_user(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
    ) -> SqliteResult<Option<BotUser>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_users WHERE bot_id = ?1 AND telegram_user_id = ?2",
            BOT_USER_COLUMNS
        ))?;

        let user = stmt
            .query_row([bot_id, telegram_user_id], bot_user_from_row)
            .ok();

        Ok(user)
    }

    pub fn set_user_state(&self, user_id: i64, state: ConversationState) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bot_users SET current_state = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![state.as_str(), &now, user_id],
        )?;

        Ok(rows_affected > 0)
    }

    pub fn set_user_scratch(&self, user_id: i64, scratch: &SessionScratch) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bot_users SET state_data = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![scratch.to_json(), &now, user_id],
        )?;

        Ok(rows_affected > 0)
    }

    /// State and scratch move together when a form step commits.
    pub fn set_user_state_and_scratch(
        &self,
        user_id: i64,
        state: ConversationState,
        scratch: &SessionScratch,
    ) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bot_users SET current_state = ?1, state_data = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![state.as_str(), scratch.to_json(), &now, user_id],
        )?;

        Ok(rows_affected > 0)
    }

    /// Plant an arbitrary state string, bypassing the enum. Only used to
    /// simulate storage corruption.
    #[cfg(test)]
    pub fn set_user_state_raw(&self, user_id: i64, state: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let rows_affected = conn.execute(
            "UPDATE bot_users SET current_state = ?1 WHERE id = ?2",
            rusqlite::params![state, user_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Cache the gate verdict on the session row.
    pub fn set_user_subscription(&self, user_id: i64, is_subscribed: bool) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bot_users SET is_subscribed = ?1, subscription_checked_at = ?2, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![if is_subscribed { 1 } else { 0 }, &now, user_id],
        )?;

        Ok(rows_affected > 0)
    }
}
