//! Webhook lifecycle management for registered bots.

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::telegram::types::WebhookOptions;
use crate::AppState;

#[derive(Serialize)]
pub struct WebhookOperationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookOperationResponse {
    fn ok(webhook_url: Option<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            webhook_url,
            data,
            error: None,
        }
    }

    fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            webhook_url: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/bots/{id}/webhook")
            .route("/register", web::post().to(register_webhook))
            .route("/remove", web::post().to(remove_webhook))
            .route("/info", web::get().to(webhook_info)),
    );
}

async fn register_webhook(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let bot_id = path.into_inner();

    let bot = match state.db.get_bot(bot_id) {
        Ok(Some(bot)) => bot,
        Ok(None) => return HttpResponse::NotFound().json(WebhookOperationResponse::err("Bot not found")),
        Err(e) => {
            log::error!("Failed to load bot {}: {}", bot_id, e);
            return HttpResponse::InternalServerError()
                .json(WebhookOperationResponse::err("Internal server error"));
        }
    };

    let Some(base_url) = state.config.public_base_url.as_deref() else {
        return HttpResponse::BadRequest().json(WebhookOperationResponse::err(
            "LEADBOT_PUBLIC_BASE_URL is not configured",
        ));
    };

    // Validate the token before pointing Telegram at us
    let me = state.transport.get_me(&bot.token).await;
    if !me.success {
        return HttpResponse::BadGateway().json(WebhookOperationResponse::err(format!(
            "Token validation failed: {}",
            me.message.as_deref().unwrap_or("unknown error")
        )));
    }

    let webhook_url = format!("{}/webhook/{}", base_url.trim_end_matches('/'), bot.id);
    let options = WebhookOptions {
        url: webhook_url.clone(),
        secret_token: bot.settings.webhook.secret().map(|s| s.to_string()),
        allowed_updates: bot.settings.webhook.allowed_updates.clone(),
        max_connections: bot.settings.webhook.max_connections,
        drop_pending_updates: false,
    };

    let response = state.transport.set_webhook(&bot.token, &options).await;
    if !response.success {
        return HttpResponse::BadGateway().json(WebhookOperationResponse::err(format!(
            "setWebhook failed: {}",
            response.message.as_deref().unwrap_or("unknown error")
        )));
    }

    if let Err(e) = state.db.set_bot_webhook(bot.id, Some(&webhook_url), true) {
        log::error!("Failed to persist webhook registration for bot {}: {}", bot.id, e);
    }

    log::info!("Webhook registered for bot {} at {}", bot.id, webhook_url);
    HttpResponse::Ok().json(WebhookOperationResponse::ok(Some(webhook_url), None))
}

async fn remove_webhook(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let bot_id = path.into_inner();

    let bot = match state.db.get_bot(bot_id) {
        Ok(Some(bot)) => bot,
        Ok(None) => return HttpResponse::NotFound().json(WebhookOperationResponse::err("Bot not found")),
        Err(e) => {
            log::error!("Failed to load bot {}: {}", bot_id, e);
            return HttpResponse::InternalServerError()
                .json(WebhookOperationResponse::err("Internal server error"));
        }
    };

    let response = state.transport.delete_webhook(&bot.token, false).await;
    if !response.success {
        return HttpResponse::BadGateway().json(WebhookOperationResponse::err(format!(
            "deleteWebhook failed: {}",
            response.message.as_deref().unwrap_or("unknown error")
        )));
    }

    if let Err(e) = state.db.set_bot_webhook(bot.id, None, false) {
        log::error!("Failed to persist webhook removal for bot {}: {}", bot.id, e);
    }

    log::info!("Webhook removed for bot {}", bot.id);
    HttpResponse::Ok().json(WebhookOperationResponse::ok(None, None))
}

async fn webhook_info(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let bot_id = path.into_inner();

    let bot = match state.db.get_bot(bot_id) {
        Ok(Some(bot)) => bot,
        Ok(None) => return HttpResponse::NotFound().json(WebhookOperationResponse::err("Bot not found")),
        Err(e) => {
            log::error!("Failed to load bot {}: {}", bot_id, e);
            return HttpResponse::InternalServerError()
                .json(WebhookOperationResponse::err("Internal server error"));
        }
    };

    let response = state.transport.get_webhook_info(&bot.token).await;
    if !response.success {
        return HttpResponse::BadGateway().json(WebhookOperationResponse::err(format!(
            "getWebhookInfo failed: {}",
            response.message.as_deref().unwrap_or("unknown error")
        )));
    }

    HttpResponse::Ok().json(WebhookOperationResponse::ok(
        bot.webhook_url.clone(),
        Some(response.data),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{test, web, App};

    use crate::config::Config;
    use crate::db::Database;
    use crate::engine::ConversationEngine;
    use crate::telegram::mock::MockTransport;
    use crate::AppState;

    fn make_state(public_base_url: Option<&str>) -> (web::Data<AppState>, i64) {
        let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
        let bot = db
            .create_bot("test", "tok", None, None, None, &[], None)
            .expect("create bot");
        let transport = Arc::new(MockTransport::new());
        let engine = Arc::new(ConversationEngine::new(db.clone(), transport.clone()));
        let state = web::Data::new(AppState {
            db,
            config: Config {
                port: 0,
                database_url: ":memory:".to_string(),
                public_base_url: public_base_url.map(|s| s.to_string()),
            },
            engine,
            transport,
        });
        (state, bot.id)
    }

    #[actix_web::test]
    async fn register_records_webhook_url() {
        let (state, bot_id) = make_state(Some("https://bots.example.com"));
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/bots/{}/webhook/register", bot_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let bot = state.db.get_bot(bot_id).unwrap().unwrap();
        assert!(bot.webhook_registered);
        assert_eq!(
            bot.webhook_url.as_deref(),
            Some(&*format!("https://bots.example.com/webhook/{}", bot_id))
        );
    }

    #[actix_web::test]
    async fn register_without_base_url_is_a_client_error() {
        let (state, bot_id) = make_state(None);
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/bots/{}/webhook/register", bot_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn remove_clears_registration() {
        let (state, bot_id) = make_state(Some("https://bots.example.com"));
        state
            .db
            .set_bot_webhook(bot_id, Some("https://bots.example.com/webhook/1"), true)
            .unwrap();
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/bots/{}/webhook/remove", bot_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let bot = state.db.get_bot(bot_id).unwrap().unwrap();
        assert!(!bot.webhook_registered);
        assert!(bot.webhook_url.is_none());
    }
}
