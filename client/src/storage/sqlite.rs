//! SQLite-backed key-value store.

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{KeyValueStore, StorageError};

/// Durable key-value store in a single `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open a connection pool.
    ///
    /// An in-memory database lives in a single connection that is never
    /// recycled; every extra connection would see a fresh, empty database.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = options.connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Run embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl KeyValueStore for SqliteKv {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StorageError>> {
        async move {
            let value: Option<String> =
                sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(value)
        }
        .boxed()
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            sqlx::query("DELETE FROM kv_store WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open() -> SqliteKv {
        let kv = SqliteKv::connect("sqlite::memory:").await.unwrap();
        kv.run_migrations().await.unwrap();
        kv
    }

    #[tokio::test]
    async fn upsert_replaces_value() {
        let kv = open().await;
        kv.set("stocktrack_last_sync", "a".into()).await.unwrap();
        kv.set("stocktrack_last_sync", "b".into()).await.unwrap();

        assert_eq!(
            kv.get("stocktrack_last_sync").await.unwrap().as_deref(),
            Some("b")
        );

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(kv.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn remove_missing_key_is_ok() {
        let kv = open().await;
        kv.remove("nothing").await.unwrap();
        assert_eq!(kv.get("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let kv = open().await;
        kv.run_migrations().await.unwrap();
    }
}
