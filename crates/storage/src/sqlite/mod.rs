use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{KeyValueStore, Storage};

mod kv_repo;
mod migrate;

/// Durable key-value backend: one `kv_entries` row per key.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteStore {
    /// Open a pool on `database_url`. Every connection runs in WAL mode and
    /// waits up to five seconds on a locked database, so a second process
    /// writing the same document file retries instead of failing at once.
    ///
    /// The `kv_entries` table is not created here; call `migrate` first.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the file cannot be opened or a pragma is
    /// rejected.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        tracing::debug!(database_url, "opened key-value database");
        Ok(Self { pool })
    }

    /// Bring the key-value schema up to date. Safe to call on every start.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a schema version fails to apply.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Open and migrate a `SQLite` document store at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or its
    /// schema cannot be brought up to date.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let store = SqliteStore::connect(database_url).await?;
        store.migrate().await?;
        let kv: Arc<dyn KeyValueStore> = Arc::new(store);
        Ok(Self { kv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rewriting_a_key_keeps_a_single_row() {
        let store = SqliteStore::connect("sqlite:file:memdb_kv_single_row?mode=memory&cache=shared")
            .await
            .unwrap();
        store.migrate().await.unwrap();
        let pool = store.pool.clone();
        let kv: Arc<dyn KeyValueStore> = Arc::new(store);

        kv.set("orbit.progress", "{}").await.unwrap();
        kv.set("orbit.progress", r#"{"user":{}}"#).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries WHERE key = ?1")
            .bind("orbit.progress")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            kv.get("orbit.progress").await.unwrap().as_deref(),
            Some(r#"{"user":{}}"#)
        );
    }
}
