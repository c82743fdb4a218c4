use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;

const MAX_POOL_CONNECTIONS: u32 = 5;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One raw row of the `user_face_embeddings` table. The embedding column
/// stays textual here; parsing happens at scan time so a malformed row
/// surfaces on the request that hits it.
#[derive(Debug, Clone)]
pub struct StoredEmbeddingRow {
    pub id: i64,
    pub user_id: String,
    pub embedding: String,
}

/// Store seam between the HTTP handlers and Postgres.
///
/// The daemon wires in [`PgStore`]; endpoint tests substitute an in-memory
/// stub.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Fetch every stored embedding row, in whatever order the database
    /// returns them (no ORDER BY is imposed).
    async fn fetch_all(&self) -> Result<Vec<StoredEmbeddingRow>, StoreError>;
}

/// Postgres-backed store. Connections are pooled; each query acquires one
/// for its own scope and releases it on drop.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<PgStore, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(database_url)
            .await?;
        Ok(PgStore { pool })
    }
}

#[async_trait]
impl EmbeddingStore for PgStore {
    async fn fetch_all(&self) -> Result<Vec<StoredEmbeddingRow>, StoreError> {
        let rows = sqlx::query("SELECT id, user_id, embedding FROM user_face_embeddings")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredEmbeddingRow {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    embedding: row.try_get("embedding")?,
                })
            })
            .collect()
    }
}
