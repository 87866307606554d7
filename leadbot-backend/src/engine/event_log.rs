//! Best-effort append-only event log.
//!
//! Entries go over a bounded channel to a writer task; a full channel drops
//! the entry and bumps a counter instead of blocking the conversation. Every
//! entry is also mirrored to the structured log, so an operator tailing logs
//! sees events even if the table write later fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::db::Database;
use crate::models::{BotLogEntry, LogEventType, LogOutcome};

const QUEUE_DEPTH: usize = 256;

#[derive(Clone)]
pub struct EventLogger {
    tx: mpsc::Sender<BotLogEntry>,
    dropped: Arc<AtomicU64>,
}

impl EventLogger {
    pub fn new(db: Arc<Database>) -> Self {
        let (tx, mut rx) = mpsc::channel::<BotLogEntry>(QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = db.insert_bot_log(&entry) {
                    log::warn!(
                        "Event log write failed (bot {}, action {}): {}",
                        entry.bot_id,
                        entry.action,
                        e
                    );
                }
            }
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn log(&self, entry: BotLogEntry) {
        log::info!(
            "bot={} user={:?} update={:?} {} {} -> {}{}",
            entry.bot_id,
            entry.telegram_user_id,
            entry.update_id,
            entry.event_type.as_str(),
            entry.action,
            entry.outcome.as_str(),
            entry
                .error_message
                .as_deref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );

        if self.tx.try_send(entry).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!("Event log queue full, entry dropped (total dropped: {})", dropped);
        }
    }

    pub fn log_message(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
        update_id: i64,
        action: &str,
        outcome: LogOutcome,
    ) {
        self.log(BotLogEntry {
            bot_id,
            telegram_user_id: Some(telegram_user_id),
            update_id: Some(update_id),
            event_type: LogEventType::Message,
            action: action.to_string(),
            outcome,
            error_message: None,
        });
    }

    pub fn log_callback(
        &self,
        bot_id: i64,
        telegram_user_id: i64,
        update_id: i64,
        action: &str,
        outcome: LogOutcome,
    ) {
        self.log(BotLogEntry {
            bot_id,
            telegram_user_id: Some(telegram_user_id),
            update_id: Some(update_id),
            event_type: LogEventType::CallbackQuery,
            action: action.to_string(),
            outcome,
            error_message: None,
        });
    }

    pub fn log_gate_check(&self, bot_id: i64, telegram_user_id: i64, subscribed: bool) {
        self.log(BotLogEntry {
            bot_id,
            telegram_user_id: Some(telegram_user_id),
            update_id: None,
            event_type: LogEventType::GateCheck,
            action: if subscribed {
                "satisfied".to_string()
            } else {
                "not_satisfied".to_string()
            },
            outcome: LogOutcome::Success,
            error_message: None,
        });
    }

    pub fn log_lead_created(&self, bot_id: i64, telegram_user_id: i64, lead_id: i64) {
        self.log(BotLogEntry {
            bot_id,
            telegram_user_id: Some(telegram_user_id),
            update_id: None,
            event_type: LogEventType::LeadCreated,
            action: format!("lead_{}", lead_id),
            outcome: LogOutcome::Success,
            error_message: None,
        });
    }

    pub fn log_error(&self, bot_id: i64, telegram_user_id: Option<i64>, update_id: Option<i64>, error: &str) {
        self.log(BotLogEntry {
            bot_id,
            telegram_user_id,
            update_id,
            event_type: LogEventType::Message,
            action: "engine_error".to_string(),
            outcome: LogOutcome::Error,
            error_message: Some(error.to_string()),
        });
    }
}
