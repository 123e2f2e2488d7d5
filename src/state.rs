use crate::config::Settings;
use crate::database::{DbPool, SessionStore};
use crate::services::intent::AnswerRouter;
use std::sync::Arc;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db_pool: DbPool,
    pub session_store: SessionStore,
    pub answer_router: Arc<AnswerRouter>,
}

impl AppState {
    pub fn session_store_pool(&self) -> &sqlx::SqlitePool {
        self.db_pool.get_pool()
    }
}
