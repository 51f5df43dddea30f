use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Chat and data endpoints consumed by the front end
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(handlers::api::chat))
        .route("/clear_history", post(handlers::api::clear_history))
        .route(
            "/summarize",
            get(handlers::api::summarize_history).post(handlers::api::summarize_conversation),
        )
        .route("/db_info", get(handlers::api::db_info))
        .route("/my_data", get(handlers::api::my_data))
}

// Account endpoints
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route("/me", get(handlers::auth::me))
}
