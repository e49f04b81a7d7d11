pub mod auth;
pub mod config;
pub mod response;
pub mod routes;

pub use routes::{app, AppState};
