//! Button layout builders. Pure functions from bot configuration and catalogue
//! rows to keyboards; no state, no I/O.

use crate::models::{Bot, Material, MaterialCategory};
use crate::telegram::types::{InlineButton, InlineKeyboard, ReplyButton, ReplyKeyboard};

use super::actions;

pub fn main_menu(bot: &Bot) -> (String, InlineKeyboard) {
    let menu = &bot.settings.messages.menu;
    let mut rows = vec![
        vec![InlineButton::callback(
            menu.materials_button(),
            actions::MENU_MATERIALS,
        )],
        vec![InlineButton::callback(
            menu.consultation_button(),
            actions::MENU_CONSULTATION,
        )],
    ];
    if let Some(url) = bot.review_url.as_deref().filter(|u| !u.is_empty()) {
        rows.push(vec![InlineButton::link(menu.review_button(), url)]);
    }

    let text = bot
        .welcome_message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or("Выберите раздел:")
        .to_string();

    (text, InlineKeyboard::new(rows))
}

pub fn gate_prompt(bot: &Bot) -> (String, InlineKeyboard) {
    let texts = &bot.settings.messages.subscription;
    let mut rows = Vec::new();
    if let Some(url) = bot.gate_channel_url() {
        rows.push(vec![InlineButton::link(texts.subscribe_button(), url)]);
    }
    rows.push(vec![InlineButton::callback(
        texts.check_button(),
        actions::CHECK_SUBSCRIPTION,
    )]);

    (texts.required_text().to_string(), InlineKeyboard::new(rows))
}

pub fn materials_list(bot: &Bot, categories: &[MaterialCategory]) -> (String, InlineKeyboard) {
    let mut rows: Vec<Vec<InlineButton>> = categories
        .iter()
        .map(|category| {
            // Pure-link categories open in the embedded browser
            match category.external_url.as_deref().filter(|u| !u.is_empty()) {
                Some(url) if category.file_id.is_none() => {
                    vec![InlineButton::web_app(&category.name, url)]
                }
                _ => vec![InlineButton::callback(
                    &category.name,
                    format!("{}{}", actions::MATERIAL_CATEGORY_PREFIX, category.id),
                )],
            }
        })
        .collect();
    rows.push(vec![InlineButton::callback(
        "⬅️ Назад",
        actions::BACK_MAIN_MENU,
    )]);

    let text = bot
        .settings
        .messages
        .materials
        .list_description()
        .to_string();

    (text, InlineKeyboard::new(rows))
}

pub fn material_category(
    category: &MaterialCategory,
    materials: &[Material],
) -> (String, InlineKeyboard) {
    let mut rows: Vec<Vec<InlineButton>> = materials
        .iter()
        .map(|material| {
            vec![InlineButton::callback(
                &material.title,
                format!("{}{}", actions::MATERIAL_DOWNLOAD_PREFIX, material.id),
            )]
        })
        .collect();
    rows.push(vec![InlineButton::callback(
        "⬅️ Назад",
        actions::BACK_MATERIALS_LIST,
    )]);

    let text = match category.description.as_deref().filter(|d| !d.is_empty()) {
        Some(description) => format!("{}\n\n{}", category.name, description),
        None => category.name.clone(),
    };

    (text, InlineKeyboard::new(rows))
}

pub fn consultation_intro(bot: &Bot) -> (String, InlineKeyboard) {
    let texts = &bot.settings.messages.consultation;
    let rows = vec![
        vec![InlineButton::callback(
            texts.start_button(),
            actions::CONSULTATION_START,
        )],
        vec![InlineButton::callback("⬅️ Назад", actions::BACK_MAIN_MENU)],
    ];

    (texts.description().to_string(), InlineKeyboard::new(rows))
}

pub fn skip_description(bot: &Bot) -> InlineKeyboard {
    InlineKeyboard::new(vec![vec![InlineButton::callback(
        bot.settings.messages.consultation.skip_description_button(),
        actions::CONSULTATION_SKIP_DESCRIPTION,
    )]])
}

/// Persistent reply keyboard mirroring the two main menu actions, when the bot
/// enables it. Labels double as recognized free-text commands.
pub fn reply_menu(bot: &Bot) -> Option<(String, ReplyKeyboard)> {
    let config = &bot.settings.reply_buttons;
    if !config.enabled {
        return None;
    }

    let materials = config
        .materials_label
        .as_deref()
        .unwrap_or_else(|| bot.settings.messages.menu.materials_button());
    let consultation = config
        .consultation_label
        .as_deref()
        .unwrap_or_else(|| bot.settings.messages.menu.consultation_button());

    let keyboard = ReplyKeyboard::new(vec![
        vec![ReplyButton::new(materials)],
        vec![ReplyButton::new(consultation)],
    ]);
    let hint = config
        .hint_text
        .as_deref()
        .unwrap_or("Кнопки меню всегда под рукой 👇")
        .to_string();

    Some((hint, keyboard))
}

/// Which menu action a free-text message maps to, if it matches a reply-button
/// label.
pub fn match_reply_label(bot: &Bot, text: &str) -> Option<&'static str> {
    let config = &bot.settings.reply_buttons;
    if !config.enabled {
        return None;
    }

    let text = text.trim();
    let materials = config
        .materials_label
        .as_deref()
        .unwrap_or_else(|| bot.settings.messages.menu.materials_button());
    let consultation = config
        .consultation_label
        .as_deref()
        .unwrap_or_else(|| bot.settings.messages.menu.consultation_button());

    if text == materials {
        Some(actions::MENU_MATERIALS)
    } else if text == consultation {
        Some(actions::MENU_CONSULTATION)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BotSettings;
    use chrono::Utc;

    fn test_bot() -> Bot {
        Bot {
            id: 1,
            name: "test".to_string(),
            token: "tok".to_string(),
            username: None,
            enabled: true,
            webhook_url: None,
            webhook_registered: false,
            welcome_message: None,
            required_channel_id: None,
            required_channel_username: Some("channel".to_string()),
            operator_chat_ids: vec![],
            review_url: Some("https://maps.example/review".to_string()),
            settings: BotSettings::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn main_menu_includes_review_link_when_configured() {
        let bot = test_bot();
        let (_, keyboard) = main_menu(&bot);
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert!(keyboard.inline_keyboard[2][0].url.is_some());

        let mut bot = test_bot();
        bot.review_url = None;
        let (_, keyboard) = main_menu(&bot);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
    }

    #[test]
    fn gate_prompt_has_subscribe_link_and_check_button() {
        let bot = test_bot();
        let (_, keyboard) = gate_prompt(&bot);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(
            keyboard.inline_keyboard[0][0].url.as_deref(),
            Some("https://t.me/channel")
        );
        assert_eq!(
            keyboard.inline_keyboard[1][0].callback_data.as_deref(),
            Some(actions::CHECK_SUBSCRIPTION)
        );
    }

    #[test]
    fn link_only_categories_render_as_web_app_buttons() {
        use crate::models::MaterialCategory;

        let link_category = MaterialCategory {
            id: 5,
            bot_id: 1,
            name: "Блог".to_string(),
            description: None,
            file_id: None,
            external_url: Some("https://example.com/blog".to_string()),
            order_index: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let file_category = MaterialCategory {
            id: 6,
            name: "Договоры".to_string(),
            file_id: Some("file-abc".to_string()),
            external_url: None,
            ..link_category.clone()
        };

        let (_, keyboard) = materials_list(&test_bot(), &[link_category, file_category]);
        assert!(keyboard.inline_keyboard[0][0].web_app.is_some());
        assert_eq!(
            keyboard.inline_keyboard[1][0].callback_data.as_deref(),
            Some("material_category_6")
        );
        // Trailing back button
        assert_eq!(
            keyboard.inline_keyboard[2][0].callback_data.as_deref(),
            Some(actions::BACK_MAIN_MENU)
        );
    }

    #[test]
    fn reply_labels_map_to_menu_actions() {
        let mut bot = test_bot();
        bot.settings.reply_buttons.enabled = true;
        bot.settings.reply_buttons.materials_label = Some("Материалы".to_string());

        assert_eq!(
            match_reply_label(&bot, " Материалы "),
            Some(actions::MENU_MATERIALS)
        );
        assert_eq!(
            match_reply_label(&bot, bot.settings.messages.menu.consultation_button()),
            Some(actions::MENU_CONSULTATION)
        );
        assert_eq!(match_reply_label(&bot, "что-то ещё"), None);

        bot.settings.reply_buttons.enabled = false;
        assert_eq!(match_reply_label(&bot, "Материалы"), None);
    }
}
