//! The conversation engine: per-user state machine driving the gate, menus,
//! intake form, and lead notification.

pub mod actions;
mod event_log;
pub mod form;
mod gate;
pub mod menu;
mod notify;

#[cfg(test)]
mod engine_tests;

pub use event_log::EventLogger;
pub use form::{FormCollector, FormField};
pub use gate::AccessGate;
pub use notify::NotificationFanout;

use std::sync::Arc;

use rusqlite::Result as SqliteResult;

use crate::db::Database;
use crate::models::{Bot, BotUser, ConversationState, LogOutcome, MaterialKind, SessionScratch, UserProfile};
use crate::telegram::types::{CallbackQuery, InlineKeyboard, Message, TgUser, Update};
use crate::telegram::ChatTransport;

const UNRECOGNIZED_TEXT: &str =
    "Не понимаю эту команду. Используйте кнопки меню для навигации.";
const SUBMIT_FAILED_TEXT: &str =
    "Произошла ошибка при отправке заявки. Пожалуйста, попробуйте позже.";

pub struct ConversationEngine {
    db: Arc<Database>,
    transport: Arc<dyn ChatTransport>,
    gate: AccessGate,
    forms: FormCollector,
    fanout: NotificationFanout,
    events: EventLogger,
}

impl ConversationEngine {
    pub fn new(db: Arc<Database>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            gate: AccessGate::new(db.clone(), transport.clone()),
            forms: FormCollector::new(db.clone()),
            fanout: NotificationFanout::new(db.clone(), transport.clone()),
            events: EventLogger::new(db.clone()),
            db,
            transport,
        }
    }

    /// Top-level dispatch for one decoded update. Never propagates an error:
    /// whatever goes wrong is logged with correlation ids and swallowed, so
    /// the webhook handler can acknowledge unconditionally.
    pub async fn handle_update(&self, bot: &Bot, update: Update) {
        let update_id = update.update_id;

        let result = if let Some(callback) = update.callback_query {
            self.handle_callback(bot, update_id, callback).await
        } else if let Some(message) = update.message {
            self.handle_message(bot, update_id, message).await
        } else {
            // edited_message, channel_post and the rest carry nothing for us
            log::debug!(
                "bot {}: update {} has no message or callback, ignored",
                bot.id,
                update_id
            );
            Ok(())
        };

        if let Err(e) = result {
            log::error!(
                "bot {}: failed to process update {}: {}",
                bot.id,
                update_id,
                e
            );
            self.events
                .log_error(bot.id, None, Some(update_id), &e.to_string());
        }
    }

    async fn handle_message(
        &self,
        bot: &Bot,
        update_id: i64,
        message: Message,
    ) -> SqliteResult<()> {
        let Some(from) = message.from else {
            return Ok(());
        };
        if from.is_bot {
            return Ok(());
        }
        let Some(text) = message.text.as_deref() else {
            // Stickers, photos etc. have no place in this flow
            return Ok(());
        };
        let chat_id = message.chat.id;

        let user = self
            .db
            .get_or_create_bot_user(bot.id, from.id, &profile_of(&from))?;

        // A restart is always honored, whatever the current state
        if text.trim() == "/start" {
            self.run_gate_funnel(bot, &user, chat_id, None).await?;
            self.events
                .log_message(bot.id, from.id, update_id, "/start", LogOutcome::Success);
            return Ok(());
        }

        let outcome = match user.state() {
            None => {
                // Unknown stored state: heal back to the menu
                log::warn!(
                    "bot {}: user {} had unknown state {:?}, resetting to main menu",
                    bot.id,
                    user.id,
                    user.current_state
                );
                self.db.set_user_state(user.id, ConversationState::MainMenu)?;
                self.show_main_menu(bot, chat_id, None).await?;
                LogOutcome::Success
            }
            Some(ConversationState::Idle) | Some(ConversationState::CheckingGate) => {
                // Free text before the gate was ever passed routes through it
                self.run_gate_funnel(bot, &user, chat_id, None).await?;
                LogOutcome::Success
            }
            Some(ConversationState::AwaitingGateConfirmation) => {
                // Deliberate narrow funnel: no reply, no state change
                LogOutcome::Failed
            }
            Some(ConversationState::MainMenu)
            | Some(ConversationState::MaterialsList)
            | Some(ConversationState::MaterialCategory)
            | Some(ConversationState::ConsultationIntro) => {
                match menu::match_reply_label(bot, text) {
                    Some(actions::MENU_MATERIALS) => {
                        self.show_materials_list(bot, &user, chat_id, None).await?;
                        LogOutcome::Success
                    }
                    Some(actions::MENU_CONSULTATION) => {
                        self.show_consultation_intro(bot, &user, chat_id, None).await?;
                        LogOutcome::Success
                    }
                    _ => {
                        self.send(bot, chat_id, UNRECOGNIZED_TEXT).await;
                        LogOutcome::Failed
                    }
                }
            }
            Some(ConversationState::FormName) => {
                self.handle_form_input(bot, &user, chat_id, FormField::Name, text)
                    .await?
            }
            Some(ConversationState::FormPhone) => {
                self.handle_form_input(bot, &user, chat_id, FormField::Phone, text)
                    .await?
            }
            Some(ConversationState::FormDescription) => {
                self.handle_form_input(bot, &user, chat_id, FormField::Description, text)
                    .await?
            }
        };

        self.events
            .log_message(bot.id, from.id, update_id, "text", outcome);
        Ok(())
    }

    async fn handle_callback(
        &self,
        bot: &Bot,
        update_id: i64,
        callback: CallbackQuery,
    ) -> SqliteResult<()> {
        // Ack first so the client stops its spinner even if handling fails
        let ack = self
            .transport
            .answer_callback_query(&bot.token, &callback.id, None)
            .await;
        if !ack.success {
            log::warn!(
                "bot {}: answerCallbackQuery failed: {}",
                bot.id,
                ack.message.as_deref().unwrap_or("unknown error")
            );
        }

        if callback.from.is_bot {
            return Ok(());
        }
        let Some(data) = callback.data.as_deref() else {
            return Ok(());
        };

        let user = self
            .db
            .get_or_create_bot_user(bot.id, callback.from.id, &profile_of(&callback.from))?;

        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(callback.from.id);
        let message_id = callback.message.as_ref().map(|m| m.message_id);

        // Narrow funnel: while awaiting gate confirmation, only the explicit
        // confirmation button does anything (it has been answered above)
        if user.state() == Some(ConversationState::AwaitingGateConfirmation)
            && data != actions::CHECK_SUBSCRIPTION
        {
            self.events
                .log_callback(bot.id, callback.from.id, update_id, data, LogOutcome::Failed);
            return Ok(());
        }

        let outcome = self
            .dispatch_callback(bot, &user, chat_id, message_id, data)
            .await?;
        self.events
            .log_callback(bot.id, callback.from.id, update_id, data, outcome);
        Ok(())
    }

    async fn dispatch_callback(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        message_id: Option<i64>,
        data: &str,
    ) -> SqliteResult<LogOutcome> {
        match data {
            actions::CHECK_SUBSCRIPTION => {
                self.run_gate_funnel(bot, user, chat_id, message_id).await?;
            }
            actions::MENU_MATERIALS | actions::BACK_MATERIALS_LIST => {
                self.show_materials_list(bot, user, chat_id, message_id).await?;
            }
            actions::MENU_CONSULTATION => {
                self.show_consultation_intro(bot, user, chat_id, message_id).await?;
            }
            actions::BACK_MAIN_MENU => {
                self.db.set_user_state(user.id, ConversationState::MainMenu)?;
                self.show_main_menu(bot, chat_id, message_id).await?;
            }
            actions::CONSULTATION_START => {
                self.forms.begin(user)?;
                self.db.set_user_state(user.id, ConversationState::FormName)?;
                self.send(bot, chat_id, bot.settings.messages.consultation.form_name_label())
                    .await;
            }
            actions::CONSULTATION_SKIP_DESCRIPTION => {
                if user.state() != Some(ConversationState::FormDescription) {
                    return Ok(LogOutcome::Failed);
                }
                self.submit_lead(bot, user, chat_id, &user.scratch).await?;
            }
            _ => {
                if let Some(category_id) =
                    actions::parse_id_suffix(data, actions::MATERIAL_CATEGORY_PREFIX)
                {
                    return self
                        .open_material_category(bot, user, chat_id, message_id, category_id)
                        .await;
                }
                if let Some(material_id) =
                    actions::parse_id_suffix(data, actions::MATERIAL_DOWNLOAD_PREFIX)
                {
                    return self
                        .deliver_material(bot, chat_id, material_id)
                        .await;
                }
                log::warn!("bot {}: unrecognized callback payload {:?}", bot.id, data);
                return Ok(LogOutcome::Failed);
            }
        }
        Ok(LogOutcome::Success)
    }

    /// Force the gate evaluation and land the user on either the main menu or
    /// the gate prompt.
    async fn run_gate_funnel(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        message_id: Option<i64>,
    ) -> SqliteResult<()> {
        self.db.set_user_state(user.id, ConversationState::CheckingGate)?;

        let satisfied = self.gate.is_satisfied(bot, user).await;
        self.events
            .log_gate_check(bot.id, user.telegram_user_id, satisfied);

        if satisfied {
            self.db.set_user_state(user.id, ConversationState::MainMenu)?;
            // Fresh entry also pins the persistent reply keyboard, if enabled
            if let Some((hint, keyboard)) = menu::reply_menu(bot) {
                let response = self
                    .transport
                    .send_reply_keyboard(&bot.token, chat_id, &hint, &keyboard)
                    .await;
                if !response.success {
                    log::warn!(
                        "bot {}: failed to pin reply keyboard: {}",
                        bot.id,
                        response.message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            self.show_main_menu(bot, chat_id, message_id).await?;
        } else {
            self.db
                .set_user_state(user.id, ConversationState::AwaitingGateConfirmation)?;
            let (text, keyboard) = menu::gate_prompt(bot);
            self.render(bot, chat_id, message_id, &text, &keyboard).await;
        }
        Ok(())
    }

    async fn show_main_menu(
        &self,
        bot: &Bot,
        chat_id: i64,
        message_id: Option<i64>,
    ) -> SqliteResult<()> {
        let (text, keyboard) = menu::main_menu(bot);
        self.render(bot, chat_id, message_id, &text, &keyboard).await;
        Ok(())
    }

    async fn show_materials_list(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        message_id: Option<i64>,
    ) -> SqliteResult<()> {
        let categories = self.db.list_active_categories(bot.id)?;
        self.db
            .set_user_state(user.id, ConversationState::MaterialsList)?;
        let (text, keyboard) = menu::materials_list(bot, &categories);
        self.render(bot, chat_id, message_id, &text, &keyboard).await;
        Ok(())
    }

    async fn show_consultation_intro(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        message_id: Option<i64>,
    ) -> SqliteResult<()> {
        self.db
            .set_user_state(user.id, ConversationState::ConsultationIntro)?;
        let (text, keyboard) = menu::consultation_intro(bot);
        self.render(bot, chat_id, message_id, &text, &keyboard).await;
        Ok(())
    }

    async fn open_material_category(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        message_id: Option<i64>,
        category_id: i64,
    ) -> SqliteResult<LogOutcome> {
        let Some(category) = self.db.get_material_category(bot.id, category_id)? else {
            log::warn!("bot {}: callback for unknown category {}", bot.id, category_id);
            return Ok(LogOutcome::Failed);
        };

        // A category with a bound file is sent directly, then back to the menu
        if let Some(file_id) = category.file_id.as_deref().filter(|f| !f.is_empty()) {
            let response = self
                .transport
                .send_document_by_file_id(&bot.token, chat_id, file_id, Some(&category.name))
                .await;
            if !response.success {
                log::warn!(
                    "bot {}: failed to send category {} file: {}",
                    bot.id,
                    category.id,
                    response.message.as_deref().unwrap_or("unknown error")
                );
                self.send(bot, chat_id, "Не удалось отправить файл. Попробуйте позже.")
                    .await;
            }
            self.db.set_user_state(user.id, ConversationState::MainMenu)?;
            self.show_main_menu(bot, chat_id, None).await?;
            return Ok(if response.success {
                LogOutcome::Success
            } else {
                LogOutcome::Failed
            });
        }

        let materials = self.db.list_active_materials(bot.id, category.id)?;
        self.db
            .set_user_state(user.id, ConversationState::MaterialCategory)?;
        let (text, keyboard) = menu::material_category(&category, &materials);
        self.render(bot, chat_id, message_id, &text, &keyboard).await;
        Ok(LogOutcome::Success)
    }

    async fn deliver_material(
        &self,
        bot: &Bot,
        chat_id: i64,
        material_id: i64,
    ) -> SqliteResult<LogOutcome> {
        let Some(material) = self.db.get_material(bot.id, material_id)? else {
            log::warn!("bot {}: callback for unknown material {}", bot.id, material_id);
            return Ok(LogOutcome::Failed);
        };

        let response = match material.kind {
            MaterialKind::TelegramFileId => match material.file_id.as_deref() {
                Some(file_id) => {
                    self.transport
                        .send_document_by_file_id(&bot.token, chat_id, file_id, Some(&material.title))
                        .await
                }
                None => {
                    log::error!("bot {}: material {} has kind file_id but no file_id", bot.id, material.id);
                    crate::telegram::ApiResponse::err("material misconfigured")
                }
            },
            MaterialKind::File => match material.file_path.as_deref() {
                Some(path) => {
                    let response = self
                        .transport
                        .send_document_path(&bot.token, chat_id, path, Some(&material.title))
                        .await;
                    // Persist the returned file_id so the next send skips the upload
                    if response.success {
                        if let Some(file_id) = response.document_file_id() {
                            if let Err(e) = self.db.set_material_file_id(material.id, &file_id) {
                                log::warn!(
                                    "bot {}: failed to store file_id for material {}: {}",
                                    bot.id,
                                    material.id,
                                    e
                                );
                            }
                        }
                    }
                    response
                }
                None => {
                    log::error!("bot {}: material {} has kind file but no path", bot.id, material.id);
                    crate::telegram::ApiResponse::err("material misconfigured")
                }
            },
            MaterialKind::Url => match material.url.as_deref() {
                Some(url) => {
                    self.send(bot, chat_id, &format!("{}\n{}", material.title, url))
                        .await
                }
                None => {
                    log::error!("bot {}: material {} has kind url but no url", bot.id, material.id);
                    crate::telegram::ApiResponse::err("material misconfigured")
                }
            },
        };

        if response.success {
            Ok(LogOutcome::Success)
        } else {
            self.send(bot, chat_id, "Не удалось отправить материал. Попробуйте позже.")
                .await;
            Ok(LogOutcome::Failed)
        }
    }

    async fn handle_form_input(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        field: FormField,
        text: &str,
    ) -> SqliteResult<LogOutcome> {
        let texts = &bot.settings.messages.consultation;
        let errors = form::validate(field, text, &bot.settings.validation);
        if !errors.is_empty() {
            let prompt = match field {
                FormField::Name => texts.form_name_label(),
                FormField::Phone => texts.form_phone_label(),
                FormField::Description => texts.form_description_label(),
            };
            let notice = format!("❌ {}\n\n{}", errors.join("\n"), prompt);
            self.send(bot, chat_id, &notice).await;
            return Ok(LogOutcome::Failed);
        }

        let value = form::sanitize(field, text);
        let scratch = form::stage_answer(user, field, &value);

        match field {
            FormField::Name => {
                self.db.set_user_state_and_scratch(
                    user.id,
                    ConversationState::FormPhone,
                    &scratch,
                )?;
                self.send(bot, chat_id, texts.form_phone_label()).await;
            }
            FormField::Phone => {
                self.db.set_user_state_and_scratch(
                    user.id,
                    ConversationState::FormDescription,
                    &scratch,
                )?;
                let keyboard = menu::skip_description(bot);
                let response = self
                    .transport
                    .send_message_with_keyboard(
                        &bot.token,
                        chat_id,
                        texts.form_description_label(),
                        &keyboard,
                    )
                    .await;
                if !response.success {
                    log::warn!(
                        "bot {}: failed to send description prompt: {}",
                        bot.id,
                        response.message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            FormField::Description => {
                // Persisted before submit so a failed submit keeps the answer
                self.db.set_user_scratch(user.id, &scratch)?;
                self.submit_lead(bot, user, chat_id, &scratch).await?;
            }
        }
        Ok(LogOutcome::Success)
    }

    /// Persist the lead, fan out notifications, thank the user, and cycle
    /// back to the main menu. Notification failures never block any of this.
    async fn submit_lead(
        &self,
        bot: &Bot,
        user: &BotUser,
        chat_id: i64,
        scratch: &SessionScratch,
    ) -> SqliteResult<()> {
        let lead = match self.forms.submit(bot, user, scratch) {
            Ok(lead) => lead,
            Err(e) => {
                log::error!(
                    "bot {}: failed to persist lead for user {}: {}",
                    bot.id,
                    user.id,
                    e
                );
                self.send(bot, chat_id, SUBMIT_FAILED_TEXT).await;
                return Ok(());
            }
        };

        self.events
            .log_lead_created(bot.id, user.telegram_user_id, lead.id);
        self.fanout.notify(bot, user, &lead).await;

        self.db.set_user_state(user.id, ConversationState::MainMenu)?;
        self.send(bot, chat_id, bot.settings.messages.consultation.thank_you())
            .await;
        self.show_main_menu(bot, chat_id, None).await?;
        Ok(())
    }

    /// Edit the originating message when there is one, otherwise send fresh.
    /// A failed edit (deleted or too-old message) falls back to sending.
    async fn render(
        &self,
        bot: &Bot,
        chat_id: i64,
        message_id: Option<i64>,
        text: &str,
        keyboard: &InlineKeyboard,
    ) {
        if let Some(message_id) = message_id {
            let response = self
                .transport
                .edit_message_text(&bot.token, chat_id, message_id, text, Some(keyboard))
                .await;
            if response.success {
                return;
            }
            log::debug!(
                "bot {}: edit of message {} failed ({}), sending fresh",
                bot.id,
                message_id,
                response.message.as_deref().unwrap_or("unknown error")
            );
        }

        let response = self
            .transport
            .send_message_with_keyboard(&bot.token, chat_id, text, keyboard)
            .await;
        if !response.success {
            log::warn!(
                "bot {}: failed to send message to chat {}: {}",
                bot.id,
                chat_id,
                response.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    async fn send(&self, bot: &Bot, chat_id: i64, text: &str) -> crate::telegram::ApiResponse {
        let response = self.transport.send_message(&bot.token, chat_id, text).await;
        if !response.success {
            log::warn!(
                "bot {}: failed to send message to chat {}: {}",
                bot.id,
                chat_id,
                response.message.as_deref().unwrap_or("unknown error")
            );
        }
        response
    }
}

fn profile_of(user: &TgUser) -> UserProfile {
    UserProfile {
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    }
}
