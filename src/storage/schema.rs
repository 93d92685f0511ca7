use super::checkpoint::{decode_state, encode_state, CheckpointStore};
use super::types::{RunState, StoreError};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// SQLite Checkpoint Store
// ============================================================================

/// Key-value checkpoint store backed by a single SQLite table.
///
/// Each deployment writes one row, identified by its state key; several
/// deployments may share a database file under different keys.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    key: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database, useful for tests.
    pub async fn open(path: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        // The file may hold webhook-adjacent operational data; keep it user-only
        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().map_or(true, |p| p.as_os_str().is_empty() || p.exists()) {
                // If creation fails, SQLite reports the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // busy_timeout=5000: wait up to 5s for another writer instead of failing with SQLITE_BUSY
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");

        // An in-memory database lives and dies with its connection, so the
        // pool must hold exactly one and never recycle it.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            key: key.into(),
        };
        store
            .migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(store)
    }

    /// Create the checkpoint table. Idempotent.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                key TEXT PRIMARY KEY NOT NULL,
                document TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored document exactly as written, if any.
    pub async fn load_raw(&self) -> Result<Option<String>, StoreError> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM checkpoints WHERE key = ?")
                .bind(&self.key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(document)
    }

    /// Overwrite the stored document without validation.
    pub async fn save_raw(&self, document: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (key, document, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&self.key)
        .bind(document)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(&self) -> Result<RunState, StoreError> {
        let raw = self.load_raw().await?;
        Ok(decode_state(raw.as_deref()))
    }

    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let document = encode_state(state)?;
        self.save_raw(&document).await?;
        tracing::debug!(key = %self.key, feeds = state.feeds.len(), "Checkpoint saved");
        Ok(())
    }
}
