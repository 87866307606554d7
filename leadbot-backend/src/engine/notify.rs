//! New-lead notification fan-out to operator chats.

use std::sync::Arc;

use rusqlite::Result as SqliteResult;

use crate::db::Database;
use crate::models::{Bot, BotUser, Consultation, RecipientPolicy};
use crate::telegram::ChatTransport;

const FALLBACK_TEMPLATE: &str = "🔔 <b>Новая заявка на консультацию</b>\n\n\
👤 Имя: {name}\n\
📞 Телефон: {phone}\n\
📝 Запрос: {description}\n\
📅 Дата: {date}\n\n\
🤖 Бот: {bot_name}\n\
👥 Отправитель: {user_info}";

/// Delivers one formatted message per discovered recipient. Never fails the
/// caller: every error is logged and absorbed, and the lead's notified flag
/// reflects whether at least one delivery went through.
pub struct NotificationFanout {
    db: Arc<Database>,
    transport: Arc<dyn ChatTransport>,
}

impl NotificationFanout {
    pub fn new(db: Arc<Database>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { db, transport }
    }

    pub async fn notify(&self, bot: &Bot, user: &BotUser, lead: &Consultation) {
        let recipients = match self.resolve_recipients(bot) {
            Ok(recipients) => recipients,
            Err(e) => {
                log::error!(
                    "Recipient discovery failed for lead {} (bot {}): {}",
                    lead.id,
                    bot.id,
                    e
                );
                Vec::new()
            }
        };

        if recipients.is_empty() {
            log::error!(
                "No notification recipients for lead {} (bot {}); lead left unnotified",
                lead.id,
                bot.id
            );
            return;
        }

        let text = self.format_message(bot, user, lead);
        let mut delivered = 0usize;

        for chat_id in &recipients {
            let response = self
                .transport
                .send_html_message(&bot.token, *chat_id, &text)
                .await;
            if response.success {
                delivered += 1;
            } else {
                log::warn!(
                    "Lead {} notification to chat {} failed: {}",
                    lead.id,
                    chat_id,
                    response.message.as_deref().unwrap_or("unknown error")
                );
            }
        }

        if delivered > 0 {
            if let Err(e) = self.db.mark_consultation_notified(lead.id) {
                log::warn!("Failed to mark lead {} notified: {}", lead.id, e);
            }
            log::info!(
                "Lead {} notified: {}/{} deliveries succeeded",
                lead.id,
                delivered,
                recipients.len()
            );
        } else {
            log::error!(
                "All {} notification deliveries failed for lead {} (bot {})",
                recipients.len(),
                lead.id,
                bot.id
            );
        }
    }

    /// Union of the policy-selected operator lists and staff operators
    /// correlated to chat identities, deduplicated, non-positive ids dropped.
    fn resolve_recipients(&self, bot: &Bot) -> SqliteResult<Vec<i64>> {
        let mut ids: Vec<i64> = match bot.settings.notifications.recipient_policy {
            RecipientPolicy::BroadcastAllActiveBots => self
                .db
                .list_active_bots()?
                .iter()
                .flat_map(|b| b.operator_chat_ids.iter().copied())
                .collect(),
            RecipientPolicy::OriginBotOnly => bot.operator_chat_ids.clone(),
        };

        ids.extend(self.db.operator_linked_chat_ids()?);

        ids.retain(|id| *id > 0);
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Render the configured template, falling back to the stock one when the
    /// configured text renders empty. The notification is never blank.
    fn format_message(&self, bot: &Bot, user: &BotUser, lead: &Consultation) -> String {
        let template = bot
            .settings
            .notifications
            .consultation_template
            .as_deref()
            .unwrap_or(FALLBACK_TEMPLATE);

        let rendered = Self::render(template, bot, user, lead);
        if rendered.trim().is_empty() {
            Self::render(FALLBACK_TEMPLATE, bot, user, lead)
        } else {
            rendered
        }
    }

    fn render(template: &str, bot: &Bot, user: &BotUser, lead: &Consultation) -> String {
        let user_info = match user.username.as_deref() {
            Some(username) => format!("{} (@{})", user.full_name(), username),
            None => format!("{} (id {})", user.full_name(), user.telegram_user_id),
        };
        let description = lead.description.as_deref().unwrap_or("—");

        template
            .replace("{name}", &html_escape(&lead.name))
            .replace("{phone}", &html_escape(&lead.phone))
            .replace("{description}", &html_escape(description))
            .replace("{date}", &lead.created_at.format("%d.%m.%Y %H:%M").to_string())
            .replace("{bot_name}", &html_escape(&bot.name))
            .replace("{user_info}", &html_escape(&user_info))
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escaping() {
        assert_eq!(html_escape("a<b> & \"c\""), "a&lt;b&gt; &amp; &quot;c&quot;");
        assert_eq!(html_escape("Иван"), "Иван");
    }
}
