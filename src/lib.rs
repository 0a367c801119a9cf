//! Sign-up / sign-in service with pluggable credential storage and JWT
//! session tokens.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod health;
pub mod state;

pub use app::build_app;
pub use config::AppConfig;
pub use state::AppState;
