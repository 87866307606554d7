use chrono::{DateTime, Utc};

use super::settings::BotSettings;

/// One deployed bot instance. Created through the configuration API; the
/// conversation engine only ever reads it.
#[derive(Debug, Clone)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub username: Option<String>,
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub webhook_registered: bool,
    pub welcome_message: Option<String>,
    /// Numeric id of the channel the user must belong to, if gated.
    pub required_channel_id: Option<i64>,
    /// Channel username (without `@`), used when no numeric id is configured.
    pub required_channel_username: Option<String>,
    /// Chat ids of the operators this bot notifies about new leads.
    pub operator_chat_ids: Vec<i64>,
    pub review_url: Option<String>,
    pub settings: BotSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    /// Chat identifier used for the gate membership call: the numeric channel
    /// id wins over the username. `None` means the gate is disabled.
    pub fn gate_chat_id(&self) -> Option<String> {
        if let Some(id) = self.required_channel_id {
            return Some(id.to_string());
        }
        self.required_channel_username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| format!("@{}", u.trim_start_matches('@')))
    }

    /// Public t.me link for the gate channel, when a username is configured.
    /// A bare numeric id has no stable public URL.
    pub fn gate_channel_url(&self) -> Option<String> {
        self.required_channel_username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| format!("https://t.me/{}", u.trim_start_matches('@')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot_with_channel(id: Option<i64>, username: Option<&str>) -> Bot {
        Bot {
            id: 1,
            name: "test".to_string(),
            token: "tok".to_string(),
            username: None,
            enabled: true,
            webhook_url: None,
            webhook_registered: false,
            welcome_message: None,
            required_channel_id: id,
            required_channel_username: username.map(|s| s.to_string()),
            operator_chat_ids: vec![],
            review_url: None,
            settings: BotSettings::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn gate_chat_id_prefers_numeric_id() {
        let bot = bot_with_channel(Some(-100123), Some("aipgroup"));
        assert_eq!(bot.gate_chat_id().as_deref(), Some("-100123"));
    }

    #[test]
    fn gate_chat_id_falls_back_to_username() {
        let bot = bot_with_channel(None, Some("@aipgroup"));
        assert_eq!(bot.gate_chat_id().as_deref(), Some("@aipgroup"));
        assert_eq!(
            bot.gate_channel_url().as_deref(),
            Some("https://t.me/aipgroup")
        );
    }

    #[test]
    fn no_channel_means_gate_disabled() {
        let bot = bot_with_channel(None, None);
        assert!(bot.gate_chat_id().is_none());
    }
}
