//! Telegram Bot API transport: wire types, the HTTP client, and the
//! transport trait the conversation engine talks through.

mod client;
pub mod mock;
pub mod types;

pub use client::TelegramClient;

use async_trait::async_trait;

use types::{InlineKeyboard, ReplyKeyboard, WebhookOptions};

/// Uniform envelope for every Bot API call. `data` carries the raw `result`
/// payload on success; `message` carries the API `description` on failure.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub success: bool,
    pub data: serde_json::Value,
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            message: Some(message.into()),
        }
    }

    /// file_id of the document in a sendDocument result, if any.
    pub fn document_file_id(&self) -> Option<String> {
        self.data
            .get("document")
            .and_then(|d| d.get("file_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Everything the engine needs from Telegram. The HTTP client implements it
/// for production; tests swap in [`mock::MockTransport`].
///
/// Every method takes the bot token because one transport serves all
/// registered bots.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> ApiResponse;

    async fn send_html_message(&self, token: &str, chat_id: i64, text: &str) -> ApiResponse;

    async fn send_message_with_keyboard(
        &self,
        token: &str,
        chat_id: i64,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> ApiResponse;

    async fn send_reply_keyboard(
        &self,
        token: &str,
        chat_id: i64,
        text: &str,
        keyboard: &ReplyKeyboard,
    ) -> ApiResponse;

    async fn send_document_by_file_id(
        &self,
        token: &str,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> ApiResponse;

    /// Upload a document from local disk. Slow path; the caller is expected
    /// to persist the returned file_id and use it next time.
    async fn send_document_path(
        &self,
        token: &str,
        chat_id: i64,
        path: &str,
        caption: Option<&str>,
    ) -> ApiResponse;

    async fn edit_message_text(
        &self,
        token: &str,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> ApiResponse;

    async fn answer_callback_query(
        &self,
        token: &str,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> ApiResponse;

    /// getChatMember. `chat_id` is either a numeric id or `@username`.
    async fn get_chat_member(&self, token: &str, chat_id: &str, user_id: i64) -> ApiResponse;

    async fn get_me(&self, token: &str) -> ApiResponse;

    async fn set_webhook(&self, token: &str, options: &WebhookOptions) -> ApiResponse;

    async fn get_webhook_info(&self, token: &str) -> ApiResponse;

    async fn delete_webhook(&self, token: &str, drop_pending_updates: bool) -> ApiResponse;
}
