use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use tagwatch_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Statements applied to every new connection. Foreign keys back the
/// cascade deletes the schema relies on; WAL and a busy timeout let the
/// poller, the socket listener, and the HTTP handlers share one file
/// without `database is locked` failures.
const CONNECTION_PRAGMAS: &[&str] = &[
    "PRAGMA foreign_keys = ON",
    "PRAGMA journal_mode = WAL",
    "PRAGMA busy_timeout = 5000",
];

/// Open the shared pool from the process configuration.
pub async fn connect(settings: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                for pragma in CONNECTION_PRAGMAS {
                    sqlx::query(pragma).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .connect(&settings.url)
        .await
}

/// Single-connection in-memory pool for tests and smoke tooling.
pub async fn connect_memory() -> Result<DbPool, sqlx::Error> {
    connect(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        timeout_secs: 30,
    })
    .await
}
