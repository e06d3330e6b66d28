pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod models;
pub mod openapi;
pub mod policy;
pub mod rate_limit;
pub mod rating;
pub mod repo;
pub mod routes;
pub mod security;
pub mod signup; // confirmation-code flow
pub mod validation;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
