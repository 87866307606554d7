use chrono::{DateTime, Utc};

/// A category in the materials catalogue. A category either carries a bound
/// Telegram file (sent directly on selection), links out to an external page,
/// or lists individual downloadable materials.
#[derive(Debug, Clone)]
pub struct MaterialCategory {
    pub id: i64,
    pub bot_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub file_id: Option<String>,
    pub external_url: Option<String>,
    pub order_index: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a material is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Previously uploaded to Telegram; resend by file_id (fastest path).
    TelegramFileId,
    /// A file on local disk, uploaded via multipart; the returned file_id is
    /// written back for future sends.
    File,
    /// A plain link, delivered as a text message.
    Url,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::TelegramFileId => "telegram_file_id",
            MaterialKind::File => "file",
            MaterialKind::Url => "url",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "telegram_file_id" => Some(MaterialKind::TelegramFileId),
            "file" => Some(MaterialKind::File),
            "url" => Some(MaterialKind::Url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub id: i64,
    pub bot_id: i64,
    pub category_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub kind: MaterialKind,
    pub file_id: Option<String>,
    pub file_path: Option<String>,
    pub url: Option<String>,
    pub order_index: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
