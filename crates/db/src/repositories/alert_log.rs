use sqlx::Row;

use tagwatch_core::domain::{AlertKind, AlertStats};

use super::{AlertLogRepository, NewAlertLogEntry, RepositoryError};
use crate::DbPool;

pub struct SqlAlertLogRepository {
    pool: DbPool,
}

impl SqlAlertLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlertLogRepository for SqlAlertLogRepository {
    async fn append(&self, new: NewAlertLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO alert_logs (user_id, ticket_id, tag, alert_type, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.ticket_id)
        .bind(&new.tag)
        .bind(new.kind.as_str())
        .bind(new.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stats_for_user(&self, user_id: i64) -> Result<Vec<AlertStats>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                DATE(timestamp) AS date,
                alert_type,
                tag,
                COUNT(*) AS alert_count
            FROM alert_logs
            WHERE user_id = ?
              AND timestamp >= DATE('now', '-14 days')
            GROUP BY DATE(timestamp), alert_type, tag
            ORDER BY DATE(timestamp) ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_raw: String = row.try_get("alert_type").map_err(RepositoryError::from)?;
            let kind = AlertKind::parse(&kind_raw)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;

            stats.push(AlertStats {
                date: row.try_get("date").map_err(RepositoryError::from)?,
                kind,
                tag: row.try_get("tag").map_err(RepositoryError::from)?,
                count: row.try_get("alert_count").map_err(RepositoryError::from)?,
            });
        }
        Ok(stats)
    }

    async fn count_for(
        &self,
        user_id: i64,
        ticket_id: i64,
        kind: AlertKind,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alert_logs WHERE user_id = ? AND ticket_id = ? AND alert_type = ?",
        )
        .bind(user_id)
        .bind(ticket_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
