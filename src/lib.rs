pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notifier;
pub mod registrations;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod ticket;

pub use db::run_migrations;
pub use state::AppState;
