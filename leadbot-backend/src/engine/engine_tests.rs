//! End-to-end tests for the conversation engine: gate funnel, menu
//! navigation, the intake form, and lead notification fan-out, all against an
//! in-memory database and a scripted transport.

use std::sync::Arc;

use serde_json::json;

use crate::db::Database;
use crate::models::{Bot, BotUser, SessionScratch};
use crate::telegram::mock::MockTransport;
use crate::telegram::types::Update;

use super::actions;
use super::ConversationEngine;

const USER_ID: i64 = 7001;

struct TestHarness {
    db: Arc<Database>,
    transport: Arc<MockTransport>,
    engine: ConversationEngine,
    bot: Bot,
}

impl TestHarness {
    /// Build a harness around one bot.
    ///
    /// * `channel`: gate channel username, `None` disables the gate
    /// * `operators`: operator chat ids on the bot profile
    /// * `settings_json`: raw settings document, `None` for defaults
    fn new(channel: Option<&str>, operators: &[i64], settings_json: Option<&str>) -> Self {
        let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
        let bot = db
            .create_bot(
                "АИП Консалтинг",
                "test-token",
                Some("aip_test_bot"),
                None,
                channel,
                operators,
                settings_json,
            )
            .expect("create bot");

        let transport = Arc::new(MockTransport::new());
        let engine = ConversationEngine::new(db.clone(), transport.clone());

        TestHarness {
            db,
            transport,
            engine,
            bot,
        }
    }

    async fn send_text(&self, text: &str) {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": {
                    "id": USER_ID,
                    "is_bot": false,
                    "first_name": "Иван",
                    "last_name": "Иванов",
                    "username": "ivan_test"
                },
                "chat": { "id": USER_ID, "type": "private" },
                "text": text
            }
        }))
        .expect("decode update");
        self.engine.handle_update(&self.bot, update).await;
    }

    async fn send_callback(&self, data: &str) {
        let update: Update = serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": {
                    "id": USER_ID,
                    "is_bot": false,
                    "first_name": "Иван",
                    "last_name": "Иванов",
                    "username": "ivan_test"
                },
                "message": {
                    "message_id": 20,
                    "chat": { "id": USER_ID, "type": "private" }
                },
                "data": data
            }
        }))
        .expect("decode update");
        self.engine.handle_update(&self.bot, update).await;
    }

    fn user(&self) -> BotUser {
        self.db
            .get_bot_user(self.bot.id, USER_ID)
            .expect("query user")
            .expect("user exists")
    }

    /// Walk a fresh user through the whole form up to the description prompt.
    async fn reach_description_step(&self) {
        self.send_text("/start").await;
        self.send_callback(actions::MENU_CONSULTATION).await;
        self.send_callback(actions::CONSULTATION_START).await;
        self.send_text("Иван Иванов").await;
        self.send_text("+79001234567").await;
        assert_eq!(self.user().current_state, "form_description");
    }
}

#[tokio::test]
async fn start_without_gate_lands_on_main_menu() {
    let h = TestHarness::new(None, &[], None);
    h.send_text("/start").await;

    assert_eq!(h.user().current_state, "main_menu");
    let texts = h.transport.texts_to(USER_ID);
    assert!(!texts.is_empty());
    // Gate disabled means zero membership lookups
    assert_eq!(h.transport.member_call_count(), 0);
}

#[tokio::test]
async fn gate_blocks_then_admits_after_subscription() {
    // TTL 0 forces a fresh membership call on every evaluation
    let h = TestHarness::new(
        Some("aipgroup"),
        &[],
        Some(r#"{"gate":{"cache_ttl_secs":0}}"#),
    );

    h.send_text("/start").await;
    assert_eq!(h.user().current_state, "awaiting_gate_confirmation");
    assert!(!h.user().is_subscribed);

    h.transport.set_member_status("@aipgroup", USER_ID, "member");
    h.send_callback(actions::CHECK_SUBSCRIPTION).await;

    assert_eq!(h.user().current_state, "main_menu");
    assert!(h.user().is_subscribed);
    assert!(h.user().subscription_checked_at.is_some());

    // Both fresh evaluations landed in the audit trail
    let checks = h.db.list_subscription_checks(h.bot.id, USER_ID).unwrap();
    assert_eq!(checks.len(), 2);
    assert!(!checks[0].is_subscribed);
    assert!(checks[1].is_subscribed);
    assert_eq!(checks[1].channel_username.as_deref(), Some("aipgroup"));
    assert_eq!(checks[1].channel_id, -1);
}

#[tokio::test]
async fn gate_cache_issues_at_most_one_upstream_call_within_ttl() {
    let h = TestHarness::new(Some("aipgroup"), &[], None);

    h.send_text("/start").await;
    h.send_text("/start").await;

    assert_eq!(h.transport.member_call_count(), 1);
    // Only the fresh evaluation produced an audit record
    assert_eq!(
        h.db.count_subscription_checks(h.bot.id, USER_ID).unwrap(),
        1
    );
}

#[tokio::test]
async fn membership_error_counts_as_not_satisfied() {
    let h = TestHarness::new(Some("aipgroup"), &[], None);
    h.transport.fail_member_lookup("@aipgroup");

    h.send_text("/start").await;
    assert_eq!(h.user().current_state, "awaiting_gate_confirmation");
}

#[tokio::test]
async fn free_text_while_awaiting_gate_is_silently_ignored() {
    let h = TestHarness::new(Some("aipgroup"), &[], None);
    h.send_text("/start").await;
    assert_eq!(h.user().current_state, "awaiting_gate_confirmation");

    let sends_before = h.transport.texts_to(USER_ID).len();
    h.send_text("пустите меня").await;

    assert_eq!(h.transport.texts_to(USER_ID).len(), sends_before);
    assert_eq!(h.user().current_state, "awaiting_gate_confirmation");
}

#[tokio::test]
async fn other_callbacks_while_awaiting_gate_are_ignored() {
    let h = TestHarness::new(Some("aipgroup"), &[], None);
    h.send_text("/start").await;

    let sends_before = h.transport.texts_to(USER_ID).len();
    h.send_callback(actions::MENU_CONSULTATION).await;

    assert_eq!(h.transport.texts_to(USER_ID).len(), sends_before);
    assert_eq!(h.user().current_state, "awaiting_gate_confirmation");
}

#[tokio::test]
async fn full_form_flow_creates_lead_and_notifies_operators() {
    let h = TestHarness::new(None, &[9900], None);
    h.reach_description_step().await;
    h.send_text("Нужна помощь с договором аренды").await;

    let leads = h.db.list_consultations(h.bot.id).unwrap();
    assert_eq!(leads.len(), 1);
    let lead = &leads[0];
    assert_eq!(lead.name, "Иван Иванов");
    assert_eq!(lead.phone, "+79001234567");
    assert_eq!(
        lead.description.as_deref(),
        Some("Нужна помощь с договором аренды")
    );
    assert_eq!(lead.status.as_str(), "new");
    assert!(lead.notified);
    assert!(lead.notified_at.is_some());

    // Scratch cleared atomically on submit, machine cycled back to the menu
    assert_eq!(h.user().scratch, SessionScratch::Empty);
    assert_eq!(h.user().current_state, "main_menu");

    // The operator got exactly one formatted notification
    let operator_messages = h.transport.texts_to(9900);
    assert_eq!(operator_messages.len(), 1);
    assert!(operator_messages[0].contains("Иван Иванов"));
    assert!(operator_messages[0].contains("+79001234567"));

    // The user got the thank-you line
    let user_messages = h.transport.texts_to(USER_ID);
    assert!(user_messages
        .iter()
        .any(|m| m.contains("Спасибо")));
}

#[tokio::test]
async fn form_answers_advance_state_and_scratch_together() {
    let h = TestHarness::new(None, &[], None);
    h.send_text("/start").await;
    h.send_callback(actions::MENU_CONSULTATION).await;
    h.send_callback(actions::CONSULTATION_START).await;

    h.send_text("Иван Иванов").await;
    let user = h.user();
    assert_eq!(user.current_state, "form_phone");
    assert_eq!(
        user.scratch.consultation().unwrap().name.as_deref(),
        Some("Иван Иванов")
    );

    h.send_text("+79001234567").await;
    let user = h.user();
    assert_eq!(user.current_state, "form_description");
    let draft = user.scratch.consultation().unwrap();
    assert_eq!(draft.name.as_deref(), Some("Иван Иванов"));
    assert_eq!(draft.phone.as_deref(), Some("+79001234567"));
}

#[tokio::test]
async fn skip_description_submits_lead_without_description() {
    let h = TestHarness::new(None, &[9900], None);
    h.reach_description_step().await;
    h.send_callback(actions::CONSULTATION_SKIP_DESCRIPTION).await;

    let leads = h.db.list_consultations(h.bot.id).unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].description, None);
    assert_eq!(h.user().current_state, "main_menu");
}

#[tokio::test]
async fn invalid_name_reprompts_without_advancing() {
    let h = TestHarness::new(None, &[], None);
    h.send_text("/start").await;
    h.send_callback(actions::MENU_CONSULTATION).await;
    h.send_callback(actions::CONSULTATION_START).await;

    h.send_text("123456").await;

    assert_eq!(h.user().current_state, "form_name");
    let texts = h.transport.texts_to(USER_ID);
    assert!(texts.last().unwrap().contains("❌"));
}

#[tokio::test]
async fn strict_phone_mode_rejects_short_numbers() {
    let h = TestHarness::new(
        None,
        &[],
        Some(r#"{"validation":{"phone_validation_strict":true}}"#),
    );
    h.send_text("/start").await;
    h.send_callback(actions::MENU_CONSULTATION).await;
    h.send_callback(actions::CONSULTATION_START).await;
    h.send_text("Иван Иванов").await;
    assert_eq!(h.user().current_state, "form_phone");

    h.send_text("123").await;
    assert_eq!(h.user().current_state, "form_phone");

    h.send_text("8 (900) 123-45-67").await;
    assert_eq!(h.user().current_state, "form_description");
}

#[tokio::test]
async fn fanout_partial_failure_still_marks_lead_notified() {
    let h = TestHarness::new(None, &[9900, 9901], None);
    h.transport.fail_sends_to(9901);

    h.reach_description_step().await;
    h.send_callback(actions::CONSULTATION_SKIP_DESCRIPTION).await;

    let lead = &h.db.list_consultations(h.bot.id).unwrap()[0];
    assert!(lead.notified);
    assert!(lead.notified_at.is_some());
}

#[tokio::test]
async fn fanout_with_zero_recipients_leaves_lead_unnotified() {
    let h = TestHarness::new(None, &[], None);

    h.reach_description_step().await;
    h.send_callback(actions::CONSULTATION_SKIP_DESCRIPTION).await;

    let lead = &h.db.list_consultations(h.bot.id).unwrap()[0];
    assert!(!lead.notified);
    assert!(lead.notified_at.is_none());
    // The flow still completed normally for the end user
    assert_eq!(h.user().current_state, "main_menu");
}

#[tokio::test]
async fn fanout_reaches_correlated_staff_operators() {
    let h = TestHarness::new(None, &[], None);
    // The submitting user's own handle doubles as a staff operator handle
    h.db.create_staff_operator(Some("Иван (оператор)"), Some("@ivan_test"))
        .unwrap();

    h.reach_description_step().await;
    h.send_callback(actions::CONSULTATION_SKIP_DESCRIPTION).await;

    let lead = &h.db.list_consultations(h.bot.id).unwrap()[0];
    assert!(lead.notified);
    // Correlation resolved the handle to the user's chat id
    assert!(h
        .transport
        .texts_to(USER_ID)
        .iter()
        .any(|m| m.contains("Новая заявка")));
}

#[tokio::test]
async fn reply_button_text_fires_menu_action() {
    let h = TestHarness::new(
        None,
        &[],
        Some(r#"{"reply_buttons":{"enabled":true,"materials_label":"Материалы"}}"#),
    );
    h.send_text("/start").await;
    assert_eq!(h.user().current_state, "main_menu");

    h.send_text("Материалы").await;
    assert_eq!(h.user().current_state, "materials_list");
}

#[tokio::test]
async fn unrecognized_free_text_in_menu_gets_buttons_notice() {
    let h = TestHarness::new(None, &[], None);
    h.send_text("/start").await;

    h.send_text("а можно просто позвонить?").await;

    assert_eq!(h.user().current_state, "main_menu");
    let texts = h.transport.texts_to(USER_ID);
    assert!(texts.last().unwrap().contains("кнопки"));
}

#[tokio::test]
async fn corrupted_state_self_heals_to_main_menu() {
    let h = TestHarness::new(None, &[], None);
    h.send_text("/start").await;
    h.db.set_user_state_raw(h.user().id, "state_from_the_future")
        .unwrap();

    h.send_text("привет").await;

    assert_eq!(h.user().current_state, "main_menu");
}

#[tokio::test]
async fn material_category_with_bound_file_sends_it_and_returns_to_menu() {
    let h = TestHarness::new(None, &[], None);
    let category = h
        .db
        .create_material_category(h.bot.id, "Договоры", None, Some("file-abc"), None, 0)
        .unwrap();

    h.send_text("/start").await;
    h.send_callback(actions::MENU_MATERIALS).await;
    assert_eq!(h.user().current_state, "materials_list");

    h.send_callback(&format!("{}{}", actions::MATERIAL_CATEGORY_PREFIX, category.id))
        .await;

    assert_eq!(h.user().current_state, "main_menu");
    let sent_file = h
        .transport
        .calls()
        .into_iter()
        .any(|c| c.method == "sendDocument/file_id" && c.text == "file-abc");
    assert!(sent_file);
}

#[tokio::test]
async fn material_upload_from_disk_persists_returned_file_id() {
    let h = TestHarness::new(None, &[], None);
    let category = h
        .db
        .create_material_category(h.bot.id, "Шаблоны", None, None, None, 0)
        .unwrap();
    let material = h
        .db
        .create_material(
            h.bot.id,
            category.id,
            "Шаблон договора",
            None,
            crate::models::MaterialKind::File,
            None,
            Some("/srv/materials/contract.pdf"),
            None,
            0,
        )
        .unwrap();

    h.send_text("/start").await;
    h.send_callback(actions::MENU_MATERIALS).await;
    h.send_callback(&format!("{}{}", actions::MATERIAL_CATEGORY_PREFIX, category.id))
        .await;
    assert_eq!(h.user().current_state, "material_category");

    h.send_callback(&format!("{}{}", actions::MATERIAL_DOWNLOAD_PREFIX, material.id))
        .await;

    // The mock echoes back an uploaded file_id; it must now be persisted
    let stored = h.db.get_material(h.bot.id, material.id).unwrap().unwrap();
    assert_eq!(
        stored.file_id.as_deref(),
        Some("uploaded:/srv/materials/contract.pdf")
    );
    assert_eq!(stored.kind, crate::models::MaterialKind::TelegramFileId);
}

#[tokio::test]
async fn category_callbacks_are_scoped_to_the_originating_bot() {
    let h = TestHarness::new(None, &[], None);
    let other_bot = h
        .db
        .create_bot("Другой бот", "other-token", None, None, None, &[], None)
        .unwrap();
    let foreign_category = h
        .db
        .create_material_category(other_bot.id, "Чужое", None, Some("foreign-file"), None, 0)
        .unwrap();

    h.send_text("/start").await;
    h.send_callback(&format!(
        "{}{}",
        actions::MATERIAL_CATEGORY_PREFIX,
        foreign_category.id
    ))
    .await;

    // The foreign file must never be delivered through this bot
    assert!(!h
        .transport
        .calls()
        .into_iter()
        .any(|c| c.text == "foreign-file"));
}
