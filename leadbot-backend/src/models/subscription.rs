use chrono::{DateTime, Utc};

/// Append-only record of one gate evaluation. Audit trail only; decisioning
/// goes through the gate cache.
#[derive(Debug, Clone)]
pub struct SubscriptionCheck {
    pub id: i64,
    pub bot_id: i64,
    pub telegram_user_id: i64,
    /// Numeric channel id, or -1 when the gate was configured by username.
    pub channel_id: i64,
    pub channel_username: Option<String>,
    pub is_subscribed: bool,
    pub checked_at: DateTime<Utc>,
}
