//! In-memory transport for tests. Records every outbound call and returns
//! scripted results instead of touching the network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::types::{InlineKeyboard, ReplyKeyboard, WebhookOptions};
use super::{ApiResponse, ChatTransport};

#[derive(Debug, Clone)]
pub struct SentCall {
    pub method: String,
    pub chat_id: i64,
    pub text: String,
}

#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<SentCall>>,
    /// chat_member status keyed by (channel chat_id, user_id); anything not
    /// scripted resolves to "left".
    member_status: Mutex<HashMap<(String, i64), String>>,
    /// getChatMember errors for these channel chat ids.
    member_errors: Mutex<HashSet<String>>,
    /// Sends to these chat ids fail.
    failing_chat_ids: Mutex<HashSet<i64>>,
    member_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_member_status(&self, chat_id: &str, user_id: i64, status: &str) {
        self.member_status
            .lock()
            .unwrap()
            .insert((chat_id.to_string(), user_id), status.to_string());
    }

    pub fn fail_member_lookup(&self, chat_id: &str) {
        self.member_errors.lock().unwrap().insert(chat_id.to_string());
    }

    pub fn fail_sends_to(&self, chat_id: i64) {
        self.failing_chat_ids.lock().unwrap().insert(chat_id);
    }

    pub fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of all messages sent to a chat, in order.
    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.chat_id == chat_id && c.method.starts_with("send"))
            .map(|c| c.text.clone())
            .collect()
    }

    pub fn member_call_count(&self) -> usize {
        self.member_calls.load(Ordering::SeqCst)
    }

    fn record(&self, method: &str, chat_id: i64, text: &str) -> ApiResponse {
        self.calls.lock().unwrap().push(SentCall {
            method: method.to_string(),
            chat_id,
            text: text.to_string(),
        });

        if self.failing_chat_ids.lock().unwrap().contains(&chat_id) {
            ApiResponse::err("Forbidden: bot was blocked by the user")
        } else {
            ApiResponse::ok(json!({ "message_id": 1 }))
        }
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(&self, _token: &str, chat_id: i64, text: &str) -> ApiResponse {
        self.record("sendMessage", chat_id, text)
    }

    async fn send_html_message(&self, _token: &str, chat_id: i64, text: &str) -> ApiResponse {
        self.record("sendMessage/html", chat_id, text)
    }

    async fn send_message_with_keyboard(
        &self,
        _token: &str,
        chat_id: i64,
        text: &str,
        _keyboard: &InlineKeyboard,
    ) -> ApiResponse {
        self.record("sendMessage/keyboard", chat_id, text)
    }

    async fn send_reply_keyboard(
        &self,
        _token: &str,
        chat_id: i64,
        text: &str,
        _keyboard: &ReplyKeyboard,
    ) -> ApiResponse {
        self.record("sendMessage/reply_keyboard", chat_id, text)
    }

    async fn send_document_by_file_id(
        &self,
        _token: &str,
        chat_id: i64,
        file_id: &str,
        _caption: Option<&str>,
    ) -> ApiResponse {
        self.record("sendDocument/file_id", chat_id, file_id)
    }

    async fn send_document_path(
        &self,
        _token: &str,
        chat_id: i64,
        path: &str,
        _caption: Option<&str>,
    ) -> ApiResponse {
        let resp = self.record("sendDocument/path", chat_id, path);
        if !resp.success {
            return resp;
        }
        ApiResponse::ok(json!({
            "message_id": 1,
            "document": { "file_id": format!("uploaded:{}", path) }
        }))
    }

    async fn edit_message_text(
        &self,
        _token: &str,
        chat_id: i64,
        _message_id: i64,
        text: &str,
        _keyboard: Option<&InlineKeyboard>,
    ) -> ApiResponse {
        self.record("editMessageText", chat_id, text)
    }

    async fn answer_callback_query(
        &self,
        _token: &str,
        callback_query_id: &str,
        _text: Option<&str>,
    ) -> ApiResponse {
        self.record("answerCallbackQuery", 0, callback_query_id)
    }

    async fn get_chat_member(&self, _token: &str, chat_id: &str, user_id: i64) -> ApiResponse {
        self.member_calls.fetch_add(1, Ordering::SeqCst);

        if self.member_errors.lock().unwrap().contains(chat_id) {
            return ApiResponse::err("Bad Request: chat not found");
        }

        let status = self
            .member_status
            .lock()
            .unwrap()
            .get(&(chat_id.to_string(), user_id))
            .cloned()
            .unwrap_or_else(|| "left".to_string());

        ApiResponse::ok(json!({ "status": status, "user": { "id": user_id } }))
    }

    async fn get_me(&self, _token: &str) -> ApiResponse {
        ApiResponse::ok(json!({ "id": 42, "is_bot": true, "username": "leadbot_test_bot" }))
    }

    async fn set_webhook(&self, _token: &str, options: &WebhookOptions) -> ApiResponse {
        self.record("setWebhook", 0, &options.url)
    }

    async fn get_webhook_info(&self, _token: &str) -> ApiResponse {
        ApiResponse::ok(json!({ "url": "", "pending_update_count": 0 }))
    }

    async fn delete_webhook(&self, _token: &str, _drop_pending_updates: bool) -> ApiResponse {
        self.record("deleteWebhook", 0, "")
    }
}
