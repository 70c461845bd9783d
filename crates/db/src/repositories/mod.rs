use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use tagwatch_core::chrono::{DateTime, Utc};
use tagwatch_core::domain::{
    AlertCacheEntry, AlertKind, AlertStats, Role, TagAlert, User,
};

pub mod alert_cache;
pub mod alert_log;
pub mod config;
pub mod memory;
pub mod tag_alert;
pub mod user;

pub use alert_cache::SqlAlertCacheRepository;
pub use alert_log::SqlAlertLogRepository;
pub use config::SqlConfigRepository;
pub use memory::{
    InMemoryAlertCacheRepository, InMemoryAlertLogRepository, InMemoryConfigRepository,
    InMemoryTagAlertRepository, InMemoryUserRepository,
};
pub use tag_alert::SqlTagAlertRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    /// Unique-index collision. For the SLA alert cache this is the dedupe
    /// signal, not a failure.
    #[error("row already exists")]
    Duplicate,
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref database_error) = error {
            if database_error.is_unique_violation() {
                return Self::Duplicate;
            }
        }
        Self::Database(error)
    }
}

/// Timestamps are written as RFC 3339; rows produced by SQLite's
/// `CURRENT_TIMESTAMP` default carry the space-separated form instead.
pub(crate) fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    tagwatch_core::chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|error| RepositoryError::Decode(format!("invalid {field}: {value}: {error}")))
}

/// Key/value runtime configuration (help-desk credentials, chat tokens,
/// feature flags). An absent key reads as `None`, never as an error.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    async fn all(&self) -> Result<BTreeMap<String, String>, RepositoryError>;
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub daily_summary: bool,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user. The first user ever created is promoted to admin
    /// regardless of the requested role.
    async fn create(&self, new: NewUser) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    async fn list_daily_summary_enabled(&self) -> Result<Vec<User>, RepositoryError>;
    async fn set_slack_user_id(
        &self,
        user_id: i64,
        slack_user_id: &str,
    ) -> Result<(), RepositoryError>;
    async fn set_daily_summary(
        &self,
        user_id: i64,
        enabled: bool,
        summary_time: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

#[derive(Clone, Debug)]
pub struct NewTagAlert {
    pub user_id: i64,
    pub tag: String,
    pub slack_channel_id: String,
    pub kind: AlertKind,
}

#[async_trait]
pub trait TagAlertRepository: Send + Sync {
    async fn create(&self, new: NewTagAlert) -> Result<TagAlert, RepositoryError>;
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<TagAlert>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<TagAlert>, RepositoryError>;
    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

#[derive(Clone, Debug)]
pub struct NewAlertCacheEntry {
    pub user_id: i64,
    pub ticket_id: i64,
    pub kind: AlertKind,
    pub breach_at: DateTime<Utc>,
}

/// Durable SLA dedupe table, unique on `(user_id, ticket_id, alert_type)`.
#[async_trait]
pub trait AlertCacheRepository: Send + Sync {
    async fn lookup(
        &self,
        user_id: i64,
        ticket_id: i64,
        kind: AlertKind,
    ) -> Result<Option<AlertCacheEntry>, RepositoryError>;
    /// Insert a fresh entry. A unique collision surfaces as
    /// [`RepositoryError::Duplicate`]; the caller evicts and retries.
    async fn insert(&self, new: NewAlertCacheEntry) -> Result<AlertCacheEntry, RepositoryError>;
    async fn evict(&self, id: i64) -> Result<(), RepositoryError>;
}

#[derive(Clone, Debug)]
pub struct NewAlertLogEntry {
    pub user_id: i64,
    pub ticket_id: i64,
    pub tag: String,
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit of every dispatched alert.
#[async_trait]
pub trait AlertLogRepository: Send + Sync {
    async fn append(&self, new: NewAlertLogEntry) -> Result<(), RepositoryError>;
    /// 14-day per-day/kind/tag counts for the console dashboard.
    async fn stats_for_user(&self, user_id: i64) -> Result<Vec<AlertStats>, RepositoryError>;
    async fn count_for(
        &self,
        user_id: i64,
        ticket_id: i64,
        kind: AlertKind,
    ) -> Result<i64, RepositoryError>;
}
