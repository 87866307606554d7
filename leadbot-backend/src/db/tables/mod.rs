mod bot_logs;
mod bot_users;
mod bots;
mod consultations;
mod materials;
mod operators;
mod subscriptions;
