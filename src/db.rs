use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::storage::{Storage, StorageEvent, EVENT_CAPACITY};

pub const CHANGE_CHANNEL: &str = "perf_console_changes";

pub async fn init_db(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store. Every write is followed by a `pg_notify` on
/// [`CHANGE_CHANNEL`]; a background listener turns notifications from any
/// process into [`StorageEvent`]s.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
    events: broadcast::Sender<StorageEvent>,
}

impl PgStorage {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: PgPool) -> Result<Self, StoreError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let forward = events.clone();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        debug!(key = notification.payload(), "store change received");
                        let _ = forward.send(StorageEvent {
                            key: notification.payload().to_string(),
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "change listener stopped");
                        break;
                    }
                }
            }
        });

        Ok(Self { pool, events })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn announce(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM perf_console.kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO perf_console.kv_store (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        self.announce(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM perf_console.kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.announce(key).await?;
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}
