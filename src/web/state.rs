use crate::auth::{SessionStore, UserStore};
use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::db::warehouse::Warehouse;
use std::sync::Arc;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
    pub warehouse: Warehouse,
    pub sessions: Arc<dyn SessionStore>,
    pub users: UserStore,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        chat: ChatService,
        warehouse: Warehouse,
        sessions: Arc<dyn SessionStore>,
        users: UserStore,
    ) -> Self {
        Self {
            config,
            chat,
            warehouse,
            sessions,
            users,
        }
    }
}
