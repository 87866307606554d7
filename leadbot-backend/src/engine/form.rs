//! Intake form validation, sanitization, and the collector that moves scratch
//! answers into a persisted lead.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Result as SqliteResult;

use crate::db::Database;
use crate::models::{Bot, BotUser, Consultation, ConsultationDraft, SessionScratch, ValidationSettings};

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[а-яА-ЯёЁa-zA-Z\s\-\.]+$").unwrap());
static STRICT_PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\+7|8)[0-9]{10}$").unwrap());
static WHITESPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PHONE_JUNK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+\-() ]").unwrap());
static MARKUP_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Phone,
    Description,
}

/// Field-level validation. An empty error list means the value is accepted.
/// Validation sees the raw input; sanitization happens separately before
/// persistence.
pub fn validate(field: FormField, raw: &str, settings: &ValidationSettings) -> Vec<String> {
    let mut errors = Vec::new();

    match field {
        FormField::Name => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                errors.push("Имя не может быть пустым".to_string());
            } else {
                if trimmed.chars().count() < 2 {
                    errors.push("Имя должно содержать минимум 2 символа".to_string());
                }
                if trimmed.chars().count() > 255 {
                    errors.push("Имя слишком длинное".to_string());
                }
                if !NAME_RE.is_match(trimmed) {
                    errors.push("Имя содержит недопустимые символы".to_string());
                }
            }
        }
        FormField::Phone => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                errors.push("Телефон не может быть пустым".to_string());
            } else {
                if trimmed.chars().count() > 50 {
                    errors.push("Телефон слишком длинный".to_string());
                }
                if settings.phone_validation_strict {
                    // Spacing and punctuation are forgiven, the digits are not
                    let compact: String = trimmed
                        .chars()
                        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
                        .collect();
                    if !STRICT_PHONE_RE.is_match(&compact) {
                        errors.push(
                            "Введите корректный номер телефона (например, +79001234567)"
                                .to_string(),
                        );
                    }
                } else if !trimmed.chars().any(|c| c.is_ascii_digit()) {
                    errors.push("Телефон должен содержать цифры".to_string());
                }
            }
        }
        FormField::Description => {
            if raw.trim().chars().count() > settings.max_description_length {
                errors.push(format!(
                    "Описание слишком длинное (максимум {} символов)",
                    settings.max_description_length
                ));
            }
        }
    }

    errors
}

/// Idempotent cleanup applied to accepted values before they reach storage.
pub fn sanitize(field: FormField, raw: &str) -> String {
    match field {
        FormField::Name => WHITESPACE_RUN_RE.replace_all(raw.trim(), " ").to_string(),
        FormField::Phone => PHONE_JUNK_RE.replace_all(raw, "").trim().to_string(),
        FormField::Description => MARKUP_TAG_RE.replace_all(raw, "").trim().to_string(),
    }
}

/// Merge one sanitized answer into the session's draft. Pure; the caller
/// commits the result together with the state advance in a single write.
pub fn stage_answer(user: &BotUser, field: FormField, value: &str) -> SessionScratch {
    let mut draft = user.scratch.consultation().cloned().unwrap_or_default();
    match field {
        FormField::Name => draft.name = Some(value.to_string()),
        FormField::Phone => draft.phone = Some(value.to_string()),
        FormField::Description => draft.description = Some(value.to_string()),
    }
    SessionScratch::Consultation(draft)
}

/// Accumulates sanitized answers on the session scratch and turns them into a
/// lead on submit.
pub struct FormCollector {
    db: Arc<Database>,
}

impl FormCollector {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Open a fresh consultation draft, discarding any previous one.
    pub fn begin(&self, user: &BotUser) -> SqliteResult<()> {
        self.db.set_user_scratch(
            user.id,
            &SessionScratch::Consultation(ConsultationDraft::default()),
        )?;
        Ok(())
    }

    /// Turn the accumulated draft into one persisted lead and clear the
    /// scratch. Missing name/phone default to empty strings; a missing or
    /// empty description becomes NULL.
    pub fn submit(
        &self,
        bot: &Bot,
        user: &BotUser,
        scratch: &SessionScratch,
    ) -> SqliteResult<Consultation> {
        let draft = scratch.consultation().cloned().unwrap_or_default();
        let name = draft.name.unwrap_or_default();
        let phone = draft.phone.unwrap_or_default();
        let description = draft.description.filter(|d| !d.trim().is_empty());

        let lead = self.db.create_consultation(
            bot.id,
            user.telegram_user_id,
            &name,
            &phone,
            description.as_deref(),
        )?;
        self.db.set_user_scratch(user.id, &SessionScratch::Empty)?;
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> ValidationSettings {
        ValidationSettings {
            phone_validation_strict: true,
            max_description_length: 1000,
        }
    }

    fn lenient() -> ValidationSettings {
        ValidationSettings {
            phone_validation_strict: false,
            max_description_length: 1000,
        }
    }

    #[test]
    fn name_rules() {
        assert!(validate(FormField::Name, "Иван Иванов", &lenient()).is_empty());
        assert!(validate(FormField::Name, "Anna-Maria J.", &lenient()).is_empty());
        assert!(!validate(FormField::Name, "", &lenient()).is_empty());
        assert!(!validate(FormField::Name, "   ", &lenient()).is_empty());
        assert!(!validate(FormField::Name, "И", &lenient()).is_empty());
        assert!(!validate(FormField::Name, "Иван123", &lenient()).is_empty());
        let long = "а".repeat(256);
        assert!(!validate(FormField::Name, &long, &lenient()).is_empty());
    }

    #[test]
    fn strict_phone_mode() {
        assert!(validate(FormField::Phone, "+79001234567", &strict()).is_empty());
        assert!(validate(FormField::Phone, "8 (900) 123-45-67", &strict()).is_empty());
        assert!(!validate(FormField::Phone, "123", &strict()).is_empty());
        assert!(!validate(FormField::Phone, "+7900123456", &strict()).is_empty());
        assert!(!validate(FormField::Phone, "", &strict()).is_empty());
    }

    #[test]
    fn lenient_phone_mode() {
        assert!(validate(FormField::Phone, "call me at 5", &lenient()).is_empty());
        assert!(!validate(FormField::Phone, "call me", &lenient()).is_empty());
        assert!(!validate(FormField::Phone, "", &lenient()).is_empty());
    }

    #[test]
    fn description_limit_is_configurable() {
        let mut settings = lenient();
        settings.max_description_length = 10;
        assert!(validate(FormField::Description, "короткий", &settings).is_empty());
        assert!(!validate(FormField::Description, "существенно длиннее лимита", &settings)
            .is_empty());
        // Optional: empty is always fine
        assert!(validate(FormField::Description, "", &settings).is_empty());
    }

    #[test]
    fn sanitize_is_idempotent() {
        let cases = [
            (FormField::Name, "  Иван   Иванов  "),
            (FormField::Phone, " +7 (900) 123-45-67 call "),
            (FormField::Description, "  нужна <b>помощь</b> с договором  "),
        ];
        for (field, raw) in cases {
            let once = sanitize(field, raw);
            assert_eq!(sanitize(field, &once), once);
        }
    }

    #[test]
    fn sanitize_rules() {
        assert_eq!(sanitize(FormField::Name, "Иван   Иванов"), "Иван Иванов");
        assert_eq!(
            sanitize(FormField::Phone, "+7 (900) 123-45-67 звонить"),
            "+7 (900) 123-45-67"
        );
        assert_eq!(
            sanitize(FormField::Description, "<script>x</script>помощь"),
            "xпомощь"
        );
    }
}
