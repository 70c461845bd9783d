use sqlx::Row;

use tagwatch_core::domain::{AlertKind, TagAlert};

use super::{NewTagAlert, RepositoryError, TagAlertRepository};
use crate::DbPool;

pub struct SqlTagAlertRepository {
    pool: DbPool,
}

impl SqlTagAlertRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TagAlertRepository for SqlTagAlertRepository {
    async fn create(&self, new: NewTagAlert) -> Result<TagAlert, RepositoryError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO user_tag_alerts (user_id, tag, slack_channel_id, alert_type)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(&new.tag)
        .bind(&new.slack_channel_id)
        .bind(new.kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(TagAlert {
            id,
            user_id: new.user_id,
            tag: new.tag,
            slack_channel_id: new.slack_channel_id,
            kind: new.kind,
        })
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<TagAlert>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, tag, slack_channel_id, alert_type
            FROM user_tag_alerts
            WHERE user_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_tag_alert).collect()
    }

    async fn list_all(&self) -> Result<Vec<TagAlert>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT uta.id, uta.user_id, uta.tag, uta.slack_channel_id, uta.alert_type
            FROM user_tag_alerts uta
            INNER JOIN users u ON uta.user_id = u.id
            ORDER BY uta.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_tag_alert).collect()
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_tag_alerts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_tag_alert(row: sqlx::sqlite::SqliteRow) -> Result<TagAlert, RepositoryError> {
    let kind_raw: String = row.try_get("alert_type").map_err(RepositoryError::from)?;
    let kind = AlertKind::parse(&kind_raw)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(TagAlert {
        id: row.try_get("id").map_err(RepositoryError::from)?,
        user_id: row.try_get("user_id").map_err(RepositoryError::from)?,
        tag: row.try_get("tag").map_err(RepositoryError::from)?,
        slack_channel_id: row.try_get("slack_channel_id").map_err(RepositoryError::from)?,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_pending;
    use crate::repositories::{NewUser, SqlUserRepository, UserRepository};
    use tagwatch_core::domain::Role;

    async fn setup() -> (SqlTagAlertRepository, SqlUserRepository) {
        let pool = crate::connect_memory().await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        (SqlTagAlertRepository::new(pool.clone()), SqlUserRepository::new(pool))
    }

    async fn seed_user(users: &SqlUserRepository, email: &str) -> i64 {
        users
            .create(NewUser {
                email: email.to_string(),
                name: "Agent".to_string(),
                role: Role::Agent,
                daily_summary: false,
            })
            .await
            .expect("seed user")
            .id
    }

    fn subscription(user_id: i64, tag: &str, kind: AlertKind) -> NewTagAlert {
        NewTagAlert {
            user_id,
            tag: tag.to_string(),
            slack_channel_id: "C1".to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn create_and_list_round_trip() {
        let (alerts, users) = setup().await;
        let user_id = seed_user(&users, "a@example.com").await;

        alerts
            .create(subscription(user_id, "urgent", AlertKind::SlaDeadline))
            .await
            .expect("create");
        alerts
            .create(subscription(user_id, "billing", AlertKind::NewTicket))
            .await
            .expect("create");

        let listed = alerts.list_for_user(user_id).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].tag, "urgent");
        assert_eq!(listed[0].kind, AlertKind::SlaDeadline);
        assert_eq!(listed[1].kind, AlertKind::NewTicket);
    }

    #[tokio::test]
    async fn list_all_spans_users() {
        let (alerts, users) = setup().await;
        let first = seed_user(&users, "a@example.com").await;
        let second = seed_user(&users, "b@example.com").await;

        alerts.create(subscription(first, "urgent", AlertKind::SlaDeadline)).await.expect("one");
        alerts.create(subscription(second, "urgent", AlertKind::TicketUpdate)).await.expect("two");

        let all = alerts.list_all().await.expect("list all");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_subscriptions() {
        let (alerts, users) = setup().await;
        let user_id = seed_user(&users, "gone@example.com").await;
        alerts.create(subscription(user_id, "urgent", AlertKind::SlaDeadline)).await.expect("sub");

        users.delete(user_id).await.expect("delete user");

        let remaining = alerts.list_all().await.expect("list all");
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_a_single_subscription() {
        let (alerts, users) = setup().await;
        let user_id = seed_user(&users, "a@example.com").await;
        let keep = alerts
            .create(subscription(user_id, "keep", AlertKind::NewTicket))
            .await
            .expect("keep");
        let drop = alerts
            .create(subscription(user_id, "drop", AlertKind::NewTicket))
            .await
            .expect("drop");

        alerts.delete(drop.id).await.expect("delete");

        let listed = alerts.list_for_user(user_id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);
    }
}
