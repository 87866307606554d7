use chrono::{DateTime, Utc};

/// A human operator of the back office. Operators are correlated to chat
/// identities by matching `handle` against stored session usernames; the
/// fan-out unions those chat ids with per-bot operator lists.
#[derive(Debug, Clone)]
pub struct StaffOperator {
    pub id: i64,
    pub name: Option<String>,
    pub handle: Option<String>,
    pub created_at: DateTime<Utc>,
}
