//! Channel-membership gate with a short-lived verdict cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::db::Database;
use crate::models::{Bot, BotUser};
use crate::telegram::ChatTransport;

/// Membership statuses that satisfy the gate.
const SATISFYING_STATUSES: [&str; 3] = ["member", "administrator", "creator"];

struct CachedVerdict {
    subscribed: bool,
    expires_at: Instant,
}

/// Decides whether a user satisfies a bot's required-channel gate. Verdicts
/// are cached per (bot, user) so button mashing does not hammer the platform;
/// the cache governs only whether a fresh upstream call is made, never whether
/// an audit record is written.
pub struct AccessGate {
    db: Arc<Database>,
    transport: Arc<dyn ChatTransport>,
    cache: DashMap<(i64, i64), CachedVerdict>,
}

impl AccessGate {
    pub fn new(db: Arc<Database>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            db,
            transport,
            cache: DashMap::new(),
        }
    }

    /// `true` when the bot has no gate configured or the user belongs to the
    /// required channel. Errors and unknown statuses count as not satisfied.
    pub async fn is_satisfied(&self, bot: &Bot, user: &BotUser) -> bool {
        let Some(gate_chat_id) = bot.gate_chat_id() else {
            return true;
        };

        let key = (bot.id, user.telegram_user_id);
        let ttl = Duration::from_secs(bot.settings.gate.cache_ttl_secs);

        if let Some(cached) = self.cache.get(&key) {
            if Instant::now() < cached.expires_at {
                return cached.subscribed;
            }
        }

        let response = self
            .transport
            .get_chat_member(&bot.token, &gate_chat_id, user.telegram_user_id)
            .await;

        let subscribed = if response.success {
            response
                .data
                .get("status")
                .and_then(|v| v.as_str())
                .map(|s| SATISFYING_STATUSES.contains(&s))
                .unwrap_or(false)
        } else {
            log::warn!(
                "Gate check failed for bot {} user {}: {}",
                bot.id,
                user.telegram_user_id,
                response.message.as_deref().unwrap_or("unknown error")
            );
            false
        };

        // Opportunistic sweep keeps one-time users from pinning entries forever
        let now = Instant::now();
        self.cache.retain(|_, v| v.expires_at > now);
        self.cache.insert(
            key,
            CachedVerdict {
                subscribed,
                expires_at: now + ttl,
            },
        );

        self.record_fresh_check(bot, user, subscribed);

        subscribed
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Audit trail and session flag, both best-effort. A failed write never
    /// changes the verdict.
    fn record_fresh_check(&self, bot: &Bot, user: &BotUser, subscribed: bool) {
        if let Err(e) = self.db.insert_subscription_check(
            bot.id,
            user.telegram_user_id,
            bot.required_channel_id.unwrap_or(-1),
            bot.required_channel_username.as_deref(),
            subscribed,
        ) {
            log::warn!("Failed to record gate check for bot {}: {}", bot.id, e);
        }

        if let Err(e) = self.db.set_user_subscription(user.id, subscribed) {
            log::warn!(
                "Failed to update subscription flag for user {}: {}",
                user.id,
                e
            );
        }
    }
}
