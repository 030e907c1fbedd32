use crate::chat::ChatSession;
use crate::session::SessionController;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Stateless session operations over the coordination records
    pub controller: Arc<SessionController>,

    /// Chat bridge; one question at a time
    pub chat: Arc<Mutex<ChatSession>>,
}

impl AppState {
    pub fn new(controller: SessionController, chat: ChatSession) -> Self {
        Self {
            controller: Arc::new(controller),
            chat: Arc::new(Mutex::new(chat)),
        }
    }
}
