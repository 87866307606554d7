//! Per-bot settings document.
//!
//! Bots carry a free-form JSON settings column; it is parsed exactly once when a
//! bot row is loaded, into this strongly typed structure with all defaults and
//! value ranges resolved up front. Code downstream never touches raw JSON.

use serde::{Deserialize, Deserializer, Serialize};

pub const SETTINGS_VERSION: u32 = 1;

/// Bounds enforced on `max_description_length` at load time.
const MIN_DESCRIPTION_LIMIT: usize = 10;
const MAX_DESCRIPTION_LIMIT: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotSettings {
    pub version: u32,
    pub webhook: WebhookSettings,
    pub messages: MessageTexts,
    pub validation: ValidationSettings,
    pub gate: GateSettings,
    pub notifications: NotificationSettings,
    pub reply_buttons: ReplyButtonSettings,
}

impl BotSettings {
    /// Parse the raw settings column. Malformed JSON falls back to defaults
    /// rather than failing the bot load; the engine must keep serving.
    pub fn parse(raw: Option<&str>) -> Self {
        let settings = match raw {
            Some(s) if !s.trim().is_empty() => match serde_json::from_str::<BotSettings>(s) {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!("Malformed bot settings document, using defaults: {}", e);
                    BotSettings::default()
                }
            },
            _ => BotSettings::default(),
        };
        settings.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.version == 0 {
            self.version = SETTINGS_VERSION;
        }
        self.validation.max_description_length = self
            .validation
            .max_description_length
            .clamp(MIN_DESCRIPTION_LIMIT, MAX_DESCRIPTION_LIMIT);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub secret_token: Option<String>,
    pub allowed_updates: Vec<String>,
    pub max_connections: u32,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret_token: None,
            allowed_updates: vec!["message".to_string(), "callback_query".to_string()],
            max_connections: 40,
        }
    }
}

impl WebhookSettings {
    pub fn secret(&self) -> Option<&str> {
        self.secret_token.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub phone_validation_strict: bool,
    pub max_description_length: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            phone_validation_strict: false,
            max_description_length: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// How long a gate evaluation stays cached before a fresh membership call.
    pub cache_ttl_secs: u64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self { cache_ttl_secs: 300 }
    }
}

/// Who receives new-lead notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecipientPolicy {
    /// Operators configured on every active bot profile (system-wide broadcast).
    #[default]
    BroadcastAllActiveBots,
    /// Only operators configured on the bot the lead came in through.
    OriginBotOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationSettings {
    pub recipient_policy: RecipientPolicy,
    #[serde(deserialize_with = "lenient_string")]
    pub consultation_template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReplyButtonSettings {
    pub enabled: bool,
    pub materials_label: Option<String>,
    pub consultation_label: Option<String>,
    pub hint_text: Option<String>,
}

/// Message-text overrides, one group per conversation screen. Every accessor
/// returns the configured text or the stock copy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MessageTexts {
    pub subscription: SubscriptionTexts,
    pub menu: MenuTexts,
    pub materials: MaterialTexts,
    pub consultation: ConsultationTexts,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SubscriptionTexts {
    pub required_text: Option<String>,
    pub subscribe_button: Option<String>,
    pub check_button: Option<String>,
}

impl SubscriptionTexts {
    pub fn required_text(&self) -> &str {
        self.required_text.as_deref().unwrap_or(
            "Для доступа к бета-версии необходимо подписаться на наш официальный Telegram-канал.",
        )
    }

    pub fn subscribe_button(&self) -> &str {
        self.subscribe_button
            .as_deref()
            .unwrap_or("🔔 Подписаться на Telegram")
    }

    pub fn check_button(&self) -> &str {
        self.check_button.as_deref().unwrap_or("✅ Я подписался")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MenuTexts {
    pub materials_button: Option<String>,
    pub consultation_button: Option<String>,
    pub review_button: Option<String>,
}

impl MenuTexts {
    pub fn materials_button(&self) -> &str {
        self.materials_button
            .as_deref()
            .unwrap_or("📂 Полезные материалы и договоры")
    }

    pub fn consultation_button(&self) -> &str {
        self.consultation_button
            .as_deref()
            .unwrap_or("📞 Записаться на консультацию")
    }

    pub fn review_button(&self) -> &str {
        self.review_button
            .as_deref()
            .unwrap_or("Оставь отзыв на Яндекс Картах")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MaterialTexts {
    pub list_description: Option<String>,
}

impl MaterialTexts {
    pub fn list_description(&self) -> &str {
        self.list_description
            .as_deref()
            .unwrap_or("Мы подготовили материалы по ключевым направлениям нашей работы.")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConsultationTexts {
    pub description: Option<String>,
    pub start_button: Option<String>,
    pub form_name_label: Option<String>,
    pub form_phone_label: Option<String>,
    pub form_description_label: Option<String>,
    pub skip_description_button: Option<String>,
    pub thank_you: Option<String>,
}

impl ConsultationTexts {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(
            "Если вашему бизнесу нужна профессиональная юридическая поддержка, \
             мы возьмём на себя все правовые вопросы.\n\n\
             Обращаясь к нам, вы сосредотачиваетесь на развитии бизнеса, а не на юридических рисках.",
        )
    }

    pub fn start_button(&self) -> &str {
        self.start_button
            .as_deref()
            .unwrap_or("📝 Записаться на консультацию")
    }

    pub fn form_name_label(&self) -> &str {
        self.form_name_label.as_deref().unwrap_or("Введите ваше имя:")
    }

    pub fn form_phone_label(&self) -> &str {
        self.form_phone_label
            .as_deref()
            .unwrap_or("Введите ваш телефон:")
    }

    pub fn form_description_label(&self) -> &str {
        self.form_description_label
            .as_deref()
            .unwrap_or("Краткое описание запроса (опционально, можете пропустить):")
    }

    pub fn skip_description_button(&self) -> &str {
        self.skip_description_button.as_deref().unwrap_or("Пропустить")
    }

    pub fn thank_you(&self) -> &str {
        self.thank_you
            .as_deref()
            .unwrap_or("Спасибо. Мы свяжемся с вами в ближайшее время.")
    }
}

/// Accept only plain JSON strings; anything else (array, object, number) is
/// treated as absent so a misconfigured template can never poison the document.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_and_malformed_fall_back_to_defaults() {
        let defaults = BotSettings::parse(None);
        assert_eq!(defaults.version, SETTINGS_VERSION);
        assert_eq!(defaults.gate.cache_ttl_secs, 300);
        assert_eq!(defaults.validation.max_description_length, 1000);
        assert!(!defaults.validation.phone_validation_strict);

        let broken = BotSettings::parse(Some("{not json"));
        assert_eq!(broken.validation.max_description_length, 1000);
    }

    #[test]
    fn description_limit_is_clamped_at_load() {
        let s = BotSettings::parse(Some(r#"{"validation":{"max_description_length":2}}"#));
        assert_eq!(s.validation.max_description_length, 10);

        let s = BotSettings::parse(Some(r#"{"validation":{"max_description_length":999999}}"#));
        assert_eq!(s.validation.max_description_length, 5000);
    }

    #[test]
    fn non_string_template_is_discarded() {
        let s = BotSettings::parse(Some(
            r#"{"notifications":{"consultation_template":["not","a","string"]}}"#,
        ));
        assert!(s.notifications.consultation_template.is_none());

        let s = BotSettings::parse(Some(r#"{"notifications":{"consultation_template":"  "}}"#));
        assert!(s.notifications.consultation_template.is_none());
    }

    #[test]
    fn configured_texts_override_stock_copy() {
        let s = BotSettings::parse(Some(
            r#"{"messages":{"consultation":{"form_name_label":"Как вас зовут?"}}}"#,
        ));
        assert_eq!(s.messages.consultation.form_name_label(), "Как вас зовут?");
        assert_eq!(s.messages.consultation.form_phone_label(), "Введите ваш телефон:");
    }
}
