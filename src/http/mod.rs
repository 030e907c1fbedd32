//! HTTP API for long-lived hosting of the dictation core
//!
//! - POST /dictation/start - Start a session
//! - POST /dictation/stop - Request a stop
//! - GET /dictation/status - Active flag and latest partial
//! - GET /dictation/result - Take the final result (204 when none)
//! - POST /chat/ask - Forward a question to the chat collaborator
//! - GET|DELETE /chat/history - List or clear past exchanges
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
