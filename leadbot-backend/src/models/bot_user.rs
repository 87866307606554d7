use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of per-user conversation states. Anything else found in
/// storage is corruption and is healed by the engine back to the main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    CheckingGate,
    AwaitingGateConfirmation,
    MainMenu,
    MaterialsList,
    MaterialCategory,
    ConsultationIntro,
    FormName,
    FormPhone,
    FormDescription,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::CheckingGate => "checking_gate",
            ConversationState::AwaitingGateConfirmation => "awaiting_gate_confirmation",
            ConversationState::MainMenu => "main_menu",
            ConversationState::MaterialsList => "materials_list",
            ConversationState::MaterialCategory => "material_category",
            ConversationState::ConsultationIntro => "consultation_intro",
            ConversationState::FormName => "form_name",
            ConversationState::FormPhone => "form_phone",
            ConversationState::FormDescription => "form_description",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(ConversationState::Idle),
            "checking_gate" => Some(ConversationState::CheckingGate),
            "awaiting_gate_confirmation" => Some(ConversationState::AwaitingGateConfirmation),
            "main_menu" => Some(ConversationState::MainMenu),
            "materials_list" => Some(ConversationState::MaterialsList),
            "material_category" => Some(ConversationState::MaterialCategory),
            "consultation_intro" => Some(ConversationState::ConsultationIntro),
            "form_name" => Some(ConversationState::FormName),
            "form_phone" => Some(ConversationState::FormPhone),
            "form_description" => Some(ConversationState::FormDescription),
            _ => None,
        }
    }
}

/// In-progress answers of the consultation intake form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultationDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Transient per-session scratch, keyed by flow. The on-disk shape is a JSON
/// object whose `consultation` key exists only while that form is in progress;
/// this shape is stable and external tooling depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionScratch {
    #[default]
    Empty,
    Consultation(ConsultationDraft),
}

impl SessionScratch {
    pub fn to_json(&self) -> String {
        match self {
            SessionScratch::Empty => "{}".to_string(),
            SessionScratch::Consultation(draft) => {
                serde_json::json!({ "consultation": draft }).to_string()
            }
        }
    }

    pub fn from_json(raw: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return SessionScratch::Empty,
        };
        match value.get("consultation") {
            Some(draft) => serde_json::from_value::<ConsultationDraft>(draft.clone())
                .map(SessionScratch::Consultation)
                .unwrap_or(SessionScratch::Empty),
            None => SessionScratch::Empty,
        }
    }

    pub fn consultation(&self) -> Option<&ConsultationDraft> {
        match self {
            SessionScratch::Consultation(draft) => Some(draft),
            SessionScratch::Empty => None,
        }
    }
}

/// Display metadata carried on inbound events, used to create or refresh a
/// session row.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

/// One conversational session per (bot, end user) pair.
#[derive(Debug, Clone)]
pub struct BotUser {
    pub id: i64,
    pub bot_id: i64,
    pub telegram_user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_subscribed: bool,
    pub subscription_checked_at: Option<DateTime<Utc>>,
    /// Raw stored state string; see [`BotUser::state`].
    pub current_state: String,
    pub scratch: SessionScratch,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BotUser {
    /// `None` means the stored state is not a defined enum value.
    pub fn state(&self) -> Option<ConversationState> {
        ConversationState::parse(&self.current_state)
    }

    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        self.username
            .clone()
            .unwrap_or_else(|| format!("User #{}", self.telegram_user_id))
    }
}
