use std::collections::BTreeMap;

use sqlx::Row;

use super::{ConfigRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConfigRepository {
    pool: DbPool,
}

impl SqlConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConfigRepository for SqlConfigRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM configuration WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get::<String, _>("value").map_err(RepositoryError::from)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO configuration (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, String>, RepositoryError> {
        let rows = sqlx::query("SELECT key, value FROM configuration")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key").map_err(RepositoryError::from)?;
            let value: String = row.try_get("value").map_err(RepositoryError::from)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}
