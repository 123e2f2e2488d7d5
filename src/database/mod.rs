pub mod models;
pub mod pool;
pub mod session_store;

pub use models::{MessageRole, StoredMessage};
pub use pool::DbPool;
pub use session_store::SessionStore;
