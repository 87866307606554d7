//! Inbound webhook endpoint.
//!
//! Telegram retries undelivered webhooks aggressively, so once a request has
//! passed bot lookup and secret validation it is always acknowledged with
//! `200 {"ok": true}`, malformed bodies and internal errors included.

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::telegram::types::Update;
use crate::AppState;

const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhook/{bot_id}").route(web::post().to(receive_update)));
}

fn ack() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}

async fn receive_update(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let bot_id = path.into_inner();

    let bot = match state.db.get_bot(bot_id) {
        Ok(Some(bot)) => bot,
        Ok(None) => {
            log::warn!("Webhook call for unknown bot {}", bot_id);
            return HttpResponse::NotFound().json(serde_json::json!({
                "success": false,
                "error": "Unknown bot"
            }));
        }
        Err(e) => {
            // Still ack: a transient DB fault must not trigger a redelivery storm
            log::error!("Webhook bot lookup failed for bot {}: {}", bot_id, e);
            return ack();
        }
    };

    if let Some(expected) = bot.settings.webhook.secret() {
        let provided = req
            .headers()
            .get(SECRET_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");
        if provided != expected {
            log::warn!("Webhook secret mismatch for bot {}", bot_id);
            return HttpResponse::Forbidden().json(serde_json::json!({
                "success": false,
                "error": "Invalid secret token"
            }));
        }
    }

    if !bot.enabled {
        log::debug!("Webhook update for disabled bot {}, dropped", bot_id);
        return ack();
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            log::warn!("Webhook for bot {} carried undecodable body: {}", bot_id, e);
            return ack();
        }
    };

    state.engine.handle_update(&bot, update).await;
    ack()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{test, web, App};
    use serde_json::json;

    use crate::config::Config;
    use crate::db::Database;
    use crate::engine::ConversationEngine;
    use crate::telegram::mock::MockTransport;
    use crate::AppState;

    fn make_state(settings_json: Option<&str>) -> (web::Data<AppState>, i64, Arc<MockTransport>) {
        let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
        let bot = db
            .create_bot("test", "tok", None, None, None, &[], settings_json)
            .expect("create bot");
        let transport = Arc::new(MockTransport::new());
        let engine = Arc::new(ConversationEngine::new(db.clone(), transport.clone()));
        let state = web::Data::new(AppState {
            db,
            config: Config {
                port: 0,
                database_url: ":memory:".to_string(),
                public_base_url: None,
            },
            engine,
            transport: transport.clone(),
        });
        (state, bot.id, transport)
    }

    fn sample_update() -> serde_json::Value {
        json!({
            "update_id": 99,
            "message": {
                "message_id": 1,
                "from": { "id": 500, "is_bot": false, "first_name": "Test" },
                "chat": { "id": 500, "type": "private" },
                "text": "/start"
            }
        })
    }

    #[actix_web::test]
    async fn processed_update_is_acked() {
        let (state, bot_id, transport) = make_state(None);
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/webhook/{}", bot_id))
            .set_json(sample_update())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        // The /start actually went through the engine
        assert!(!transport.texts_to(500).is_empty());
    }

    #[actix_web::test]
    async fn wrong_secret_is_rejected_without_side_effects() {
        let (state, bot_id, transport) =
            make_state(Some(r#"{"webhook":{"secret_token":"s3cret"}}"#));
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/webhook/{}", bot_id))
            .insert_header(("X-Telegram-Bot-Api-Secret-Token", "wrong"))
            .set_json(sample_update())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 403);
        // No session, no outbound traffic, no event attributed to the user
        assert!(state.db.get_bot_user(bot_id, 500).unwrap().is_none());
        assert!(transport.calls().is_empty());
        assert_eq!(state.db.count_bot_logs(bot_id).unwrap(), 0);
    }

    #[actix_web::test]
    async fn correct_secret_is_accepted() {
        let (state, bot_id, _) = make_state(Some(r#"{"webhook":{"secret_token":"s3cret"}}"#));
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/webhook/{}", bot_id))
            .insert_header(("X-Telegram-Bot-Api-Secret-Token", "s3cret"))
            .set_json(sample_update())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn unknown_bot_is_a_404() {
        let (state, _, _) = make_state(None);
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/webhook/424242")
            .set_json(sample_update())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn malformed_body_is_still_acked() {
        let (state, bot_id, transport) = make_state(None);
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/webhook/{}", bot_id))
            .set_payload("this is not json")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert!(transport.calls().is_empty());
    }

    #[actix_web::test]
    async fn disabled_bot_updates_are_dropped_but_acked() {
        let (state, bot_id, transport) = make_state(None);
        state.db.set_bot_enabled(bot_id, false).unwrap();
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(super::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/webhook/{}", bot_id))
            .set_json(sample_update())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert!(transport.calls().is_empty());
    }
}
