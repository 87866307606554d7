use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod config;
mod controllers;
mod db;
mod engine;
mod models;
mod telegram;

use config::Config;
use db::Database;
use engine::ConversationEngine;
use telegram::{ChatTransport, TelegramClient};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub engine: Arc<ConversationEngine>,
    pub transport: Arc<dyn ChatTransport>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramClient::new());
    let engine = Arc::new(ConversationEngine::new(db.clone(), transport.clone()));

    log::info!("Starting leadbot server on port {}", port);
    if config.public_base_url.is_none() {
        log::warn!("LEADBOT_PUBLIC_BASE_URL not set, webhook registration is unavailable");
    }

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                engine: Arc::clone(&engine),
                transport: Arc::clone(&transport),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::bots::config)
            .configure(controllers::webhook::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
