//! Lead database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::{Consultation, LeadStatus};

fn consultation_from_row(row: &rusqlite::Row) -> rusqlite::Result<Consultation> {
    let status_str: String = row.get(6)?;
    let notified_at_str: Option<String> = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;

    Ok(Consultation {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        telegram_user_id: row.get(2)?,
        name: row.get(3)?,
        phone: row.get(4)?,
        description: row.get(5)?,
        status: LeadStatus::parse(&status_str).unwrap_or(LeadStatus::New),
        admin_notes: row.get(7)?,
        notified: row.get::<_, i32>(8)? != 0,
        notified_at: notified_at_str.map(|s| {
            DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)
        }),
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const CONSULTATION_COLUMNS: &str = "id, bot_id, telegram_user_id, name, phone, description, \
     status, admin_notes, notified, notified_at, created_at, updated_at";

impl Database {
    pub fn create_consultation(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
        name: &str,
        phone: &str,
        description: Option<&str>,
    ) -> SqliteResult<Consultation> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO bot_consultations (bot_id, telegram_user_id, name, phone, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'new', ?6, ?6)",
            rusqlite::params![bot_id, telegram_user_id, name, phone, description, &now],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_consultation(id).map(|opt| opt.unwrap())
    }

    pub fn get_consultation(&self, id: i64) -> SqliteResult<Option<Consultation>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_consultations WHERE id = ?1",
            CONSULTATION_COLUMNS
        ))?;

        let consultation = stmt.query_row([id], consultation_from_row).ok();

        Ok(consultation)
    }

    pub fn list_consultations(&self, bot_id: i64) -> SqliteResult<Vec<Consultation>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_consultations WHERE bot_id = ?1 ORDER BY created_at DESC",
            CONSULTATION_COLUMNS
        ))?;

        let consultations = stmt
            .query_map([bot_id], consultation_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(consultations)
    }

    /// Flip the notified flag after at least one operator delivery succeeded.
    pub fn mark_consultation_notified(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bot_consultations SET notified = 1, notified_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![&now, id],
        )?;

        Ok(rows_affected > 0)
    }
}
