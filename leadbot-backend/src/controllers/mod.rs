pub mod bots;
pub mod health;
pub mod webhook;
