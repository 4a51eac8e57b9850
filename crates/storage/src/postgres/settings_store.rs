//! Settings store implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use gavel_core::error::{StorageError, StorageResult};
use gavel_core::models::SettingRow;
use gavel_core::ports::SettingsStore;

use super::database::Database;

/// PostgreSQL implementation of [`SettingsStore`].
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn upsert_setting(&self, row: &SettingRow) -> StorageResult<()> {
        sqlx::query(UPSERT_SETTING)
            .bind(&row.setting_name)
            .bind(&row.setting_value)
            .bind(row.observed_at_block as i64)
            .bind(row.indexed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_setting(&self, name: &str) -> StorageResult<Option<SettingRow>> {
        let row = sqlx::query_as::<_, SettingDbRow>(
            r#"
            SELECT setting_name, setting_value, observed_at_block, indexed_at
            FROM pallet_settings
            WHERE setting_name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(row.map(SettingDbRow::into_row))
    }
}

/// Keyed by name alone: each setting always reflects the most recently
/// observed block's value, whatever the block ordering.
pub(crate) const UPSERT_SETTING: &str = r#"
    INSERT INTO pallet_settings (
        setting_name, setting_value, observed_at_block, indexed_at
    )
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (setting_name) DO UPDATE SET
        setting_value = EXCLUDED.setting_value,
        observed_at_block = EXCLUDED.observed_at_block,
        indexed_at = EXCLUDED.indexed_at
"#;

#[derive(sqlx::FromRow)]
struct SettingDbRow {
    setting_name: String,
    setting_value: String,
    observed_at_block: i64,
    indexed_at: chrono::DateTime<chrono::Utc>,
}

impl SettingDbRow {
    fn into_row(self) -> SettingRow {
        SettingRow {
            setting_name: self.setting_name,
            setting_value: self.setting_value,
            observed_at_block: self.observed_at_block as u64,
            indexed_at: self.indexed_at,
        }
    }
}
