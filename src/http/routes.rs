use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Dictation control
        .route("/dictation/start", post(handlers::start_dictation))
        .route("/dictation/stop", post(handlers::stop_dictation))
        // Dictation queries
        .route("/dictation/status", get(handlers::dictation_status))
        .route("/dictation/result", get(handlers::dictation_result))
        // Chat bridge
        .route("/chat/ask", post(handlers::ask))
        .route(
            "/chat/history",
            get(handlers::chat_history).delete(handlers::clear_chat_history),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
