use super::{DbPool, MessageRole, StoredMessage};
use crate::services::intent::LoanTopic;
use crate::utils::error::ApiError;
use anyhow::Result;
use chrono::{Duration, SecondsFormat, Utc};
use sqlx::Row;
use tracing::{debug, info};

/// Durable, TTL-bounded session and chat-history storage.
///
/// Sessions carry a single tracked loan topic next to their message log.
/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// lexicographic comparison in SQL matches chronological order.
#[derive(Clone)]
pub struct SessionStore {
    pool: DbPool,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create base tables and apply additive column migrations.
    ///
    /// Databases written by earlier schema versions lack `last_active`,
    /// `last_loan_type` and `is_active`; those columns are added in place
    /// and default to unset / active without data loss.
    pub async fn init_schema(&self) -> Result<()> {
        let pool = self.pool.get_pool();

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)",
        )
        .execute(pool)
        .await?;

        for (column, ddl) in [
            ("last_active", "ALTER TABLE sessions ADD COLUMN last_active TEXT"),
            ("last_loan_type", "ALTER TABLE sessions ADD COLUMN last_loan_type TEXT"),
            ("is_active", "ALTER TABLE sessions ADD COLUMN is_active INTEGER DEFAULT 1"),
        ] {
            if !self.column_exists("sessions", column).await? {
                info!("Migrating sessions table: adding column {}", column);
                sqlx::query(ddl).execute(pool).await?;
            }
        }

        debug!("Session schema ensured");
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(self.pool.get_pool())
            .await?;

        for row in rows {
            let name: String = row.try_get("name")?;
            if name == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Create the session if absent and refresh its activity timestamp.
    /// Idempotent: repeat calls only bump `last_active`.
    pub async fn ensure(&self, session_id: &str) -> Result<(), ApiError> {
        let now = now_rfc3339();
        let pool = self.pool.get_pool();

        sqlx::query(
            r#"INSERT OR IGNORE INTO sessions (session_id, created_at, last_active, is_active)
               VALUES (?, ?, ?, 1)"#,
        )
        .bind(session_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        sqlx::query("UPDATE sessions SET last_active = ?, is_active = 1 WHERE session_id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Append a message to the session's ordered log.
    ///
    /// Fails with `NotFound` when the session does not exist; callers must
    /// `ensure` first. The activity refresh happens before the insert so a
    /// concurrent expiry sweep computed against an older cutoff cannot
    /// delete the session out from under the append.
    pub async fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ApiError> {
        let now = now_rfc3339();
        let pool = self.pool.get_pool();

        let touched = sqlx::query("UPDATE sessions SET last_active = ? WHERE session_id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(pool)
            .await?;

        if touched.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!(
                "session '{}' does not exist",
                session_id
            )));
        }

        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Up to `limit` most recent messages in chronological (oldest-first)
    /// order. Unknown or inactive sessions yield an empty history, never an
    /// error.
    pub async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let pool = self.pool.get_pool();

        let active = sqlx::query_scalar::<_, i64>(
            "SELECT is_active FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

        match active {
            Some(1) => {}
            _ => return Ok(Vec::new()),
        }

        sqlx::query("UPDATE sessions SET last_active = ? WHERE session_id = ?")
            .bind(now_rfc3339())
            .bind(session_id)
            .execute(pool)
            .await?;

        let rows = sqlx::query(
            r#"SELECT role, content FROM messages
               WHERE session_id = ?
               ORDER BY id DESC
               LIMIT ?"#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        let mut messages: Vec<StoredMessage> = rows
            .into_iter()
            .map(|row| {
                let role: String = row.get("role");
                StoredMessage {
                    role: MessageRole::from_db(&role),
                    content: row.get("content"),
                }
            })
            .collect();

        messages.reverse();
        Ok(messages)
    }

    /// Record the session's active loan topic.
    pub async fn set_topic(&self, session_id: &str, topic: LoanTopic) -> Result<(), ApiError> {
        let touched = sqlx::query(
            "UPDATE sessions SET last_loan_type = ?, last_active = ? WHERE session_id = ?",
        )
        .bind(topic.display_name())
        .bind(now_rfc3339())
        .bind(session_id)
        .execute(self.pool.get_pool())
        .await?;

        if touched.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!(
                "session '{}' does not exist",
                session_id
            )));
        }
        Ok(())
    }

    /// Read the active loan topic. Unknown sessions and sessions without a
    /// recorded topic both read as `None`. Counts as session activity.
    pub async fn get_topic(&self, session_id: &str) -> Result<Option<LoanTopic>, ApiError> {
        let pool = self.pool.get_pool();

        sqlx::query("UPDATE sessions SET last_active = ? WHERE session_id = ?")
            .bind(now_rfc3339())
            .bind(session_id)
            .execute(pool)
            .await?;

        let stored = sqlx::query_scalar::<_, Option<String>>(
            "SELECT last_loan_type FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

        Ok(stored.flatten().as_deref().and_then(LoanTopic::from_db))
    }

    /// Delete every session (and its messages) idle longer than the given
    /// number of minutes. Idempotent; a session touched after the cutoff was
    /// computed keeps its fresher `last_active` and survives the sweep.
    pub async fn expire(&self, older_than_minutes: i64) -> Result<u64, ApiError> {
        let cutoff = (Utc::now() - Duration::minutes(older_than_minutes))
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        // One transaction: a session is swept with its messages or not at all
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(
            r#"DELETE FROM messages
               WHERE session_id IN (
                   SELECT session_id FROM sessions WHERE last_active < ?
               )"#,
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        let removed = sqlx::query("DELETE FROM sessions WHERE last_active < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let count = removed.rows_affected();
        if count > 0 {
            info!("Expired {} idle session(s)", count);
        }
        Ok(count)
    }

    /// Purge a session's messages, forget its topic and mark it inactive.
    pub async fn clear(&self, session_id: &str) -> Result<(), ApiError> {
        let pool = self.pool.get_pool();

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(pool)
            .await?;

        sqlx::query(
            "UPDATE sessions SET is_active = 0, last_loan_type = NULL WHERE session_id = ?",
        )
        .bind(session_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Reactivate a session (used when starting fresh).
    pub async fn activate(&self, session_id: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET is_active = 1, last_active = ? WHERE session_id = ?")
            .bind(now_rfc3339())
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SessionStore {
    let store = SessionStore::new(DbPool::in_memory().await);
    store.init_schema().await.expect("schema init");
    store
}
