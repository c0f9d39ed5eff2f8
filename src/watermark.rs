//! Durable per-chain block watermark

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{RelayError, RelayResult};
use crate::types::ChainId;

/// Last fully processed block per chain
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, chain_id: ChainId) -> RelayResult<Option<u64>>;
    async fn store(&self, chain_id: ChainId, block: u64) -> RelayResult<()>;
}

/// Process-local store; watermarks are lost on restart
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    blocks: Mutex<HashMap<ChainId, u64>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self, chain_id: ChainId) -> RelayResult<Option<u64>> {
        let blocks = self.blocks.lock().map_err(|e| RelayError::Watermark {
            chain_id,
            message: e.to_string(),
        })?;
        Ok(blocks.get(&chain_id).copied())
    }

    async fn store(&self, chain_id: ChainId, block: u64) -> RelayResult<()> {
        let mut blocks = self.blocks.lock().map_err(|e| RelayError::Watermark {
            chain_id,
            message: e.to_string(),
        })?;
        blocks.insert(chain_id, block);
        Ok(())
    }
}

/// Postgres-backed store (`relay_watermarks` table)
#[derive(Debug, Clone)]
pub struct PgWatermarkStore {
    pool: PgPool,
}

impl PgWatermarkStore {
    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .wrap_err("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .wrap_err("Failed to run database migrations")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn load(&self, chain_id: ChainId) -> RelayResult<Option<u64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"SELECT last_processed_block FROM relay_watermarks WHERE chain_id = $1"#,
        )
        .bind(chain_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RelayError::Watermark {
            chain_id,
            message: e.to_string(),
        })?;

        Ok(row.map(|(block,)| block.max(0) as u64))
    }

    async fn store(&self, chain_id: ChainId, block: u64) -> RelayResult<()> {
        let block = i64::try_from(block).map_err(|_| RelayError::Watermark {
            chain_id,
            message: format!("block {} exceeds BIGINT", block),
        })?;

        sqlx::query(
            r#"
            INSERT INTO relay_watermarks (chain_id, last_processed_block)
            VALUES ($1, $2)
            ON CONFLICT (chain_id) DO UPDATE SET last_processed_block = $2, updated_at = NOW()
            "#,
        )
        .bind(chain_id.to_string())
        .bind(block)
        .execute(&self.pool)
        .await
        .map_err(|e| RelayError::Watermark {
            chain_id,
            message: e.to_string(),
        })?;

        Ok(())
    }
}
