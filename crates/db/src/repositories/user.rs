use sqlx::Row;

use tagwatch_core::chrono::{DateTime, Utc};
use tagwatch_core::domain::{Role, User};

use super::{parse_datetime, NewUser, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, name, role, daily_summary, summary_time, slack_user_id, \
                            created_at, updated_at";

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, new: NewUser) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&mut *tx).await?;
        // The first sign-in owns the installation.
        let role = if existing == 0 { Role::Admin } else { new.role };

        let now = Utc::now().to_rfc3339();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, name, role, daily_summary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new.email)
        .bind(&new.name)
        .bind(role.as_str())
        .bind(new.daily_summary)
        .bind(&now)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let created = self.find_by_id(id).await?;
        created.ok_or_else(|| RepositoryError::Decode(format!("user {id} vanished after insert")))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(decode_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER(?)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_user).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(decode_user).collect()
    }

    async fn list_daily_summary_enabled(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE daily_summary = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_user).collect()
    }

    async fn set_slack_user_id(
        &self,
        user_id: i64,
        slack_user_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET slack_user_id = ?, updated_at = ? WHERE id = ?")
            .bind(slack_user_id)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_daily_summary(
        &self,
        user_id: i64,
        enabled: bool,
        summary_time: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET daily_summary = ?, summary_time = ?, updated_at = ? WHERE id = ?",
        )
        .bind(enabled)
        .bind(summary_time.map(|time| time.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_user(row: sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let role_raw: String = row.try_get("role").map_err(RepositoryError::from)?;
    let role = Role::parse(&role_raw)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    let created_at_raw: String = row.try_get("created_at").map_err(RepositoryError::from)?;
    let updated_at_raw: String = row.try_get("updated_at").map_err(RepositoryError::from)?;
    let summary_time_raw: Option<String> =
        row.try_get("summary_time").map_err(RepositoryError::from)?;

    Ok(User {
        id: row.try_get("id").map_err(RepositoryError::from)?,
        email: row.try_get("email").map_err(RepositoryError::from)?,
        name: row.try_get("name").map_err(RepositoryError::from)?,
        role,
        daily_summary: row.try_get("daily_summary").map_err(RepositoryError::from)?,
        summary_time: summary_time_raw
            .map(|raw| parse_datetime("summary_time", &raw))
            .transpose()?,
        slack_user_id: row.try_get("slack_user_id").map_err(RepositoryError::from)?,
        created_at: parse_datetime("created_at", &created_at_raw)?,
        updated_at: parse_datetime("updated_at", &updated_at_raw)?,
    })
}
