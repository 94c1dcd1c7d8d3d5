//! Mangrov: marketplace, barter matching and chat behind a JSON API.

pub mod auth;
pub mod chat;
pub mod chat_models;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod matching;
pub mod media;
pub mod models;
pub mod optimistic;
pub mod profile;
pub mod routes;
pub mod state;
pub mod storage;
pub mod trades;
pub mod unread;
pub mod user_models;
pub mod validation;
pub mod ws;

pub use routes::router;
pub use state::AppState;
