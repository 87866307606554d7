//! HTTP client for the Telegram Bot API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::types::{InlineKeyboard, ReplyKeyboard, WebhookOptions};
use super::{ApiResponse, ChatTransport};

const API_BASE_URL: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// File uploads go over the same API but can take much longer
const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TelegramClient {
    http: reqwest::Client,
    media_http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            media_http: reqwest::Client::builder()
                .timeout(MEDIA_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, token, method)
    }

    /// POST a JSON body and translate the Bot API envelope into [`ApiResponse`].
    async fn call(&self, token: &str, method: &str, body: serde_json::Value) -> ApiResponse {
        let url = self.method_url(token, method);

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log::error!("Telegram: {} request failed: {}", method, e);
                return ApiResponse::err(format!("Failed to reach Telegram: {}", e));
            }
        };

        Self::translate(method, resp).await
    }

    async fn translate(method: &str, resp: reqwest::Response) -> ApiResponse {
        let envelope: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                log::error!("Telegram: {} returned unparseable body: {}", method, e);
                return ApiResponse::err(format!("Failed to parse response: {}", e));
            }
        };

        if envelope.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            ApiResponse::ok(envelope.get("result").cloned().unwrap_or(json!(true)))
        } else {
            let description = envelope
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown Telegram API error");
            log::warn!("Telegram: {} rejected: {}", method, description);
            ApiResponse::err(description)
        }
    }
}

impl Default for TelegramClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> ApiResponse {
        self.call(
            token,
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text }),
        )
        .await
    }

    async fn send_html_message(&self, token: &str, chat_id: i64, text: &str) -> ApiResponse {
        self.call(
            token,
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" }),
        )
        .await
    }

    async fn send_message_with_keyboard(
        &self,
        token: &str,
        chat_id: i64,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> ApiResponse {
        self.call(
            token,
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text, "reply_markup": keyboard }),
        )
        .await
    }

    async fn send_reply_keyboard(
        &self,
        token: &str,
        chat_id: i64,
        text: &str,
        keyboard: &ReplyKeyboard,
    ) -> ApiResponse {
        self.call(
            token,
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text, "reply_markup": keyboard }),
        )
        .await
    }

    async fn send_document_by_file_id(
        &self,
        token: &str,
        chat_id: i64,
        file_id: &str,
        caption: Option<&str>,
    ) -> ApiResponse {
        let mut body = json!({ "chat_id": chat_id, "document": file_id });
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
        self.call(token, "sendDocument", body).await
    }

    async fn send_document_path(
        &self,
        token: &str,
        chat_id: i64,
        path: &str,
        caption: Option<&str>,
    ) -> ApiResponse {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Telegram: cannot read document {}: {}", path, e);
                return ApiResponse::err(format!("Failed to read file: {}", e));
            }
        };

        let file_name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let url = self.method_url(token, "sendDocument");
        let resp = match self.media_http.post(&url).multipart(form).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log::error!("Telegram: sendDocument upload failed: {}", e);
                return ApiResponse::err(format!("Failed to reach Telegram: {}", e));
            }
        };

        Self::translate("sendDocument", resp).await
    }

    async fn edit_message_text(
        &self,
        token: &str,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> ApiResponse {
        let mut body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard).unwrap_or(json!(null));
        }
        self.call(token, "editMessageText", body).await
    }

    async fn answer_callback_query(
        &self,
        token: &str,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> ApiResponse {
        let mut body = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call(token, "answerCallbackQuery", body).await
    }

    async fn get_chat_member(&self, token: &str, chat_id: &str, user_id: i64) -> ApiResponse {
        self.call(
            token,
            "getChatMember",
            json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await
    }

    async fn get_me(&self, token: &str) -> ApiResponse {
        self.call(token, "getMe", json!({})).await
    }

    async fn set_webhook(&self, token: &str, options: &WebhookOptions) -> ApiResponse {
        let body = serde_json::to_value(options).unwrap_or(json!({}));
        self.call(token, "setWebhook", body).await
    }

    async fn get_webhook_info(&self, token: &str) -> ApiResponse {
        self.call(token, "getWebhookInfo", json!({})).await
    }

    async fn delete_webhook(&self, token: &str, drop_pending_updates: bool) -> ApiResponse {
        self.call(
            token,
            "deleteWebhook",
            json!({ "drop_pending_updates": drop_pending_updates }),
        )
        .await
    }
}
