//! Block store implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use gavel_core::error::{StorageError, StorageResult};
use gavel_core::models::{Block, BlockHash};
use gavel_core::ports::BlockStore;

use super::database::Database;
use super::helpers::bytes_to_hash32;

/// PostgreSQL implementation of [`BlockStore`].
pub struct PgBlockStore {
    pool: PgPool,
}

impl PgBlockStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl BlockStore for PgBlockStore {
    async fn insert_block(&self, block: &Block) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO blocks (number, hash, parent_hash, extrinsics_count, indexed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(block.number as i64)
        .bind(&block.hash.0[..])
        .bind(&block.parent_hash.0[..])
        .bind(block.extrinsics_count as i32)
        .bind(block.indexed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT number, hash, parent_hash, extrinsics_count, indexed_at
            FROM blocks
            WHERE number = $1
            "#,
        )
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(BlockRow::into_block).transpose()
    }

    async fn block_number_by_hash(&self, hash: &BlockHash) -> StorageResult<Option<u64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT number FROM blocks WHERE hash = $1")
            .bind(&hash.0[..])
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(row.map(|(number,)| number as u64))
    }

    async fn latest_block_number(&self) -> StorageResult<Option<u64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(number) FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(row.0.map(|number| number as u64))
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct BlockRow {
    number: i64,
    hash: Vec<u8>,
    parent_hash: Vec<u8>,
    extrinsics_count: i32,
    indexed_at: chrono::DateTime<chrono::Utc>,
}

impl BlockRow {
    fn into_block(self) -> StorageResult<Block> {
        Ok(Block {
            number: self.number as u64,
            hash: BlockHash(bytes_to_hash32(self.hash, "block.hash")?),
            parent_hash: BlockHash(bytes_to_hash32(self.parent_hash, "block.parent_hash")?),
            extrinsics_count: self.extrinsics_count as u32,
            indexed_at: self.indexed_at,
        })
    }
}
