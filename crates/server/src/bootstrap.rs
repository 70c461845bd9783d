use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tagwatch_core::config::{AppConfig, ConfigError, LoadOptions};
use tagwatch_core::notify::NotificationBus;
use tagwatch_core::sse::SseHub;
use tagwatch_db::repositories::{
    SqlAlertCacheRepository, SqlAlertLogRepository, SqlConfigRepository, SqlTagAlertRepository,
    SqlUserRepository,
};
use tagwatch_db::{connect, migrations, DbPool};
use tagwatch_engine::{ConfigBackedChatSink, Core, ZendeskHelpdeskFactory};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub core: Core,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Load config, open the database, run migrations, and assemble the `Core`
/// every worker shares. Only database failures are fatal here; missing
/// runtime credentials are handled by the per-service gates later.
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");
    let config = AppConfig::load(options)?;

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!("database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!("database migrations applied");

    let hub = Arc::new(SseHub::new());
    let notifications = Arc::new(NotificationBus::new(hub.clone()));
    let config_store = Arc::new(SqlConfigRepository::new(db_pool.clone()));
    let chat = Arc::new(ConfigBackedChatSink::new(config_store.clone()));

    let core = Core {
        config: config_store,
        users: Arc::new(SqlUserRepository::new(db_pool.clone())),
        tag_alerts: Arc::new(SqlTagAlertRepository::new(db_pool.clone())),
        alert_cache: Arc::new(SqlAlertCacheRepository::new(db_pool.clone())),
        alert_log: Arc::new(SqlAlertLogRepository::new(db_pool.clone())),
        helpdesk: Arc::new(ZendeskHelpdeskFactory),
        alerts: chat.clone(),
        chat,
        hub,
        notifications,
    };

    Ok(Application { config, db_pool, core })
}

#[cfg(test)]
mod tests {
    use tagwatch_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                google_client_id: Some("client-id".to_string()),
                google_client_secret: Some("client-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_the_core() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('users', 'user_tag_alerts', 'configuration', 'alert_logs', 'sla_alert_cache')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should exist after bootstrap");
        assert_eq!(table_count, 5);

        assert!(!app.core.keys_ready(tagwatch_engine::REQUIRED_ZENDESK_KEYS).await);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_google_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                google_client_id: Some(String::new()),
                google_client_secret: Some(String::new()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap must fail").to_string();
        assert!(message.contains("google_client_id"));
    }
}
