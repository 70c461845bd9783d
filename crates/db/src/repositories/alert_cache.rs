use sqlx::Row;

use tagwatch_core::chrono::Utc;
use tagwatch_core::domain::{AlertCacheEntry, AlertKind};

use super::{parse_datetime, AlertCacheRepository, NewAlertCacheEntry, RepositoryError};
use crate::DbPool;

pub struct SqlAlertCacheRepository {
    pool: DbPool,
}

impl SqlAlertCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlertCacheRepository for SqlAlertCacheRepository {
    async fn lookup(
        &self,
        user_id: i64,
        ticket_id: i64,
        kind: AlertKind,
    ) -> Result<Option<AlertCacheEntry>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, ticket_id, alert_type, breach_at, created_at
            FROM sla_alert_cache
            WHERE user_id = ? AND ticket_id = ? AND alert_type = ?
            "#,
        )
        .bind(user_id)
        .bind(ticket_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_entry).transpose()
    }

    async fn insert(&self, new: NewAlertCacheEntry) -> Result<AlertCacheEntry, RepositoryError> {
        let created_at = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sla_alert_cache (user_id, ticket_id, alert_type, breach_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(new.ticket_id)
        .bind(new.kind.as_str())
        .bind(new.breach_at.to_rfc3339())
        .bind(created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(AlertCacheEntry {
            id,
            user_id: new.user_id,
            ticket_id: new.ticket_id,
            kind: new.kind,
            breach_at: new.breach_at,
            created_at,
        })
    }

    async fn evict(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sla_alert_cache WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_entry(row: sqlx::sqlite::SqliteRow) -> Result<AlertCacheEntry, RepositoryError> {
    let kind_raw: String = row.try_get("alert_type").map_err(RepositoryError::from)?;
    let kind = AlertKind::parse(&kind_raw)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    let breach_at_raw: String = row.try_get("breach_at").map_err(RepositoryError::from)?;
    let created_at_raw: String = row.try_get("created_at").map_err(RepositoryError::from)?;

    Ok(AlertCacheEntry {
        id: row.try_get("id").map_err(RepositoryError::from)?,
        user_id: row.try_get("user_id").map_err(RepositoryError::from)?,
        ticket_id: row.try_get("ticket_id").map_err(RepositoryError::from)?,
        kind,
        breach_at: parse_datetime("breach_at", &breach_at_raw)?,
        created_at: parse_datetime("created_at", &created_at_raw)?,
    })
}
