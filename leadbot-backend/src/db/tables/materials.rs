//! Materials catalogue database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::{Material, MaterialCategory, MaterialKind};

fn category_from_row(row: &rusqlite::Row) -> rusqlite::Result<MaterialCategory> {
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(MaterialCategory {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        file_id: row.get(4)?,
        external_url: row.get(5)?,
        order_index: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

fn material_from_row(row: &rusqlite::Row) -> rusqlite::Result<Material> {
    let kind_str: String = row.get(5)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;

    Ok(Material {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        category_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        kind: MaterialKind::parse(&kind_str).unwrap_or(MaterialKind::Url),
        file_id: row.get(6)?,
        file_path: row.get(7)?,
        url: row.get(8)?,
        order_index: row.get(9)?,
        is_active: row.get::<_, i32>(10)? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

const CATEGORY_COLUMNS: &str = "id, bot_id, name, description, file_id, external_url, \
     order_index, is_active, created_at, updated_at";

const MATERIAL_COLUMNS: &str = "id, bot_id, category_id, title, description, kind, file_id, \
     file_path, url, order_index, is_active, created_at, updated_at";

impl Database {
    pub fn create_material_category(
        &self,
        bot_id: i64,
        name: &str,
        description: Option<&str>,
        file_id: Option<&str>,
        external_url: Option<&str>,
        order_index: i32,
    ) -> SqliteResult<MaterialCategory> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO bot_material_categories (bot_id, name, description, file_id, external_url, order_index, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            rusqlite::params![bot_id, name, description, file_id, external_url, order_index, &now],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_material_category(bot_id, id).map(|opt| opt.unwrap())
    }

    /// Category lookups are bot-scoped so a callback from one bot can never
    /// address another bot's catalogue.
    pub fn get_material_category(
        &self,
        bot_id: i64,
        id: i64,
    ) -> SqliteResult<Option<MaterialCategory>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_material_categories WHERE bot_id = ?1 AND id = ?2",
            CATEGORY_COLUMNS
        ))?;

        let category = stmt.query_row([bot_id, id], category_from_row).ok();

        Ok(category)
    }

    pub fn list_active_categories(&self, bot_id: i64) -> SqliteResult<Vec<MaterialCategory>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_material_categories WHERE bot_id = ?1 AND is_active = 1 ORDER BY order_index, id",
            CATEGORY_COLUMNS
        ))?;

        let categories = stmt
            .query_map([bot_id], category_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(categories)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_material(
        &self,
        bot_id: i64,
        category_id: i64,
        title: &str,
        description: Option<&str>,
        kind: MaterialKind,
        file_id: Option<&str>,
        file_path: Option<&str>,
        url: Option<&str>,
        order_index: i32,
    ) -> SqliteResult<Material> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO bot_materials (bot_id, category_id, title, description, kind, file_id, file_path, url, order_index, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
            rusqlite::params![
                bot_id,
                category_id,
                title,
                description,
                kind.as_str(),
                file_id,
                file_path,
                url,
                order_index,
                &now,
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_material(bot_id, id).map(|opt| opt.unwrap())
    }

    pub fn get_material(&self, bot_id: i64, id: i64) -> SqliteResult<Option<Material>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_materials WHERE bot_id = ?1 AND id = ?2",
            MATERIAL_COLUMNS
        ))?;

        let material = stmt.query_row([bot_id, id], material_from_row).ok();

        Ok(material)
    }

    pub fn list_active_materials(
        &self,
        bot_id: i64,
        category_id: i64,
    ) -> SqliteResult<Vec<Material>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bot_materials WHERE bot_id = ?1 AND category_id = ?2 AND is_active = 1 ORDER BY order_index, id",
            MATERIAL_COLUMNS
        ))?;

        let materials = stmt
            .query_map([bot_id, category_id], material_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(materials)
    }

    /// After a disk upload Telegram returns a file_id; persist it so the next
    /// send skips the upload.
    pub fn set_material_file_id(&self, id: i64, file_id: &str) -> SqliteResult<bool> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            "UPDATE bot_materials SET file_id = ?1, kind = 'telegram_file_id', updated_at = ?2 WHERE id = ?3",
            rusqlite::params![file_id, &now, id],
        )?;

        Ok(rows_affected > 0)
    }
}
