use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub(super) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        // Bots table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                token TEXT UNIQUE NOT NULL,
                username TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                webhook_url TEXT,
                webhook_registered INTEGER NOT NULL DEFAULT 0,
                welcome_message TEXT,
                required_channel_id INTEGER,
                required_channel_username TEXT,
                operator_chat_ids TEXT NOT NULL DEFAULT '[]',
                review_url TEXT,
                settings TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Per-bot conversation sessions
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                telegram_user_id INTEGER NOT NULL,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                language_code TEXT,
                is_subscribed INTEGER NOT NULL DEFAULT 0,
                subscription_checked_at TEXT,
                current_state TEXT NOT NULL DEFAULT 'idle',
                state_data TEXT NOT NULL DEFAULT '{}',
                last_interaction_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(bot_id, telegram_user_id)
            )",
            [],
        )?;

        // Gate evaluation audit trail
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                telegram_user_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                channel_username TEXT,
                is_subscribed INTEGER NOT NULL,
                checked_at TEXT NOT NULL
            )",
            [],
        )?;

        // Captured leads
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_consultations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                telegram_user_id INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                description TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                admin_notes TEXT,
                notified INTEGER NOT NULL DEFAULT 0,
                notified_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Best-effort event log
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                telegram_user_id INTEGER,
                update_id INTEGER,
                event_type TEXT NOT NULL,
                action TEXT NOT NULL,
                outcome TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Materials catalogue
        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_material_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                file_id TEXT,
                external_url TEXT,
                order_index INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_materials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                kind TEXT NOT NULL,
                file_id TEXT,
                file_path TEXT,
                url TEXT,
                order_index INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Back-office operators, correlated to chats by handle
        conn.execute(
            "CREATE TABLE IF NOT EXISTS staff_operators (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                handle TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_parent_directory_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("leadbot.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();

        let bot = db
            .create_bot("test", "tok", None, None, None, &[], None)
            .unwrap();
        assert_eq!(bot.name, "test");
        assert!(path.exists());
    }

    #[test]
    fn reopening_an_existing_database_keeps_its_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leadbot.db");

        {
            let db = Database::new(path.to_str().unwrap()).unwrap();
            db.create_bot("test", "tok", None, None, None, &[], None)
                .unwrap();
        }

        let db = Database::new(path.to_str().unwrap()).unwrap();
        assert_eq!(db.list_active_bots().unwrap().len(), 1);
    }
}
