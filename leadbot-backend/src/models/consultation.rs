use chrono::{DateTime, Utc};

/// Lifecycle of a captured lead. Only external operator tooling moves a lead
/// past `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadStatus {
    New,
    InProgress,
    Closed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::InProgress => "in_progress",
            LeadStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(LeadStatus::New),
            "in_progress" => Some(LeadStatus::InProgress),
            "closed" => Some(LeadStatus::Closed),
            _ => None,
        }
    }
}

/// One completed consultation intake form.
#[derive(Debug, Clone)]
pub struct Consultation {
    pub id: i64,
    pub bot_id: i64,
    pub telegram_user_id: i64,
    pub name: String,
    pub phone: String,
    pub description: Option<String>,
    pub status: LeadStatus,
    pub admin_notes: Option<String>,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
