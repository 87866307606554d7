/// Category of an event-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventType {
    Message,
    CallbackQuery,
    GateCheck,
    LeadCreated,
}

impl LogEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventType::Message => "message",
            LogEventType::CallbackQuery => "callback_query",
            LogEventType::GateCheck => "gate_check",
            LogEventType::LeadCreated => "lead_created",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Success,
    Failed,
    Error,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutcome::Success => "success",
            LogOutcome::Failed => "failed",
            LogOutcome::Error => "error",
        }
    }
}

/// One append-only event-log entry, written best-effort.
#[derive(Debug, Clone)]
pub struct BotLogEntry {
    pub bot_id: i64,
    pub telegram_user_id: Option<i64>,
    pub update_id: Option<i64>,
    pub event_type: LogEventType,
    pub action: String,
    pub outcome: LogOutcome,
    pub error_message: Option<String>,
}
