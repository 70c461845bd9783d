//! In-memory repository implementations for tests and offline harnesses.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use tagwatch_core::chrono::{DateTime, Duration, Utc};
use tagwatch_core::domain::{AlertCacheEntry, AlertKind, AlertLogEntry, AlertStats, Role, TagAlert, User};

use super::{
    AlertCacheRepository, AlertLogRepository, ConfigRepository, NewAlertCacheEntry,
    NewAlertLogEntry, NewTagAlert, NewUser, RepositoryError, TagAlertRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryConfigRepository {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryConfigRepository {
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<BTreeMap<_, _>>();
        Self { entries: RwLock::new(entries) }
    }
}

#[async_trait::async_trait]
impl ConfigRepository for InMemoryConfigRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.entries.write().await.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, String>, RepositoryError> {
        Ok(self.entries.read().await.clone())
    }
}

#[derive(Default)]
struct UserState {
    next_id: i64,
    users: HashMap<i64, User>,
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    state: RwLock<UserState>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, new: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|user| user.email.eq_ignore_ascii_case(&new.email)) {
            return Err(RepositoryError::Duplicate);
        }

        let role = if state.users.is_empty() { Role::Admin } else { new.role };
        state.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_id,
            email: new.email,
            name: new.name,
            role,
            daily_summary: new.daily_summary,
            summary_time: None,
            slack_user_id: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    async fn list_daily_summary_enabled(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|user| user.daily_summary)
            .cloned()
            .collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    async fn set_slack_user_id(
        &self,
        user_id: i64,
        slack_user_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.slack_user_id = Some(slack_user_id.to_owned());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_daily_summary(
        &self,
        user_id: i64,
        enabled: bool,
        summary_time: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            user.daily_summary = enabled;
            user.summary_time = summary_time;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(self.state.read().await.users.len() as i64)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.state.write().await.users.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
struct TagAlertState {
    next_id: i64,
    alerts: Vec<TagAlert>,
}

#[derive(Default)]
pub struct InMemoryTagAlertRepository {
    state: RwLock<TagAlertState>,
}

#[async_trait::async_trait]
impl TagAlertRepository for InMemoryTagAlertRepository {
    async fn create(&self, new: NewTagAlert) -> Result<TagAlert, RepositoryError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let alert = TagAlert {
            id: state.next_id,
            user_id: new.user_id,
            tag: new.tag,
            slack_channel_id: new.slack_channel_id,
            kind: new.kind,
        };
        state.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<TagAlert>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .alerts
            .iter()
            .filter(|alert| alert.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<TagAlert>, RepositoryError> {
        Ok(self.state.read().await.alerts.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.state.write().await.alerts.retain(|alert| alert.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct AlertCacheState {
    next_id: i64,
    entries: Vec<AlertCacheEntry>,
}

#[derive(Default)]
pub struct InMemoryAlertCacheRepository {
    state: RwLock<AlertCacheState>,
}

impl InMemoryAlertCacheRepository {
    pub async fn entries(&self) -> Vec<AlertCacheEntry> {
        self.state.read().await.entries.clone()
    }
}

#[async_trait::async_trait]
impl AlertCacheRepository for InMemoryAlertCacheRepository {
    async fn lookup(
        &self,
        user_id: i64,
        ticket_id: i64,
        kind: AlertKind,
    ) -> Result<Option<AlertCacheEntry>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .iter()
            .find(|entry| {
                entry.user_id == user_id && entry.ticket_id == ticket_id && entry.kind == kind
            })
            .cloned())
    }

    async fn insert(&self, new: NewAlertCacheEntry) -> Result<AlertCacheEntry, RepositoryError> {
        let mut state = self.state.write().await;
        let collision = state.entries.iter().any(|entry| {
            entry.user_id == new.user_id
                && entry.ticket_id == new.ticket_id
                && entry.kind == new.kind
        });
        if collision {
            return Err(RepositoryError::Duplicate);
        }

        state.next_id += 1;
        let entry = AlertCacheEntry {
            id: state.next_id,
            user_id: new.user_id,
            ticket_id: new.ticket_id,
            kind: new.kind,
            breach_at: new.breach_at,
            created_at: Utc::now(),
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn evict(&self, id: i64) -> Result<(), RepositoryError> {
        self.state.write().await.entries.retain(|entry| entry.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct AlertLogState {
    next_id: i64,
    entries: Vec<AlertLogEntry>,
}

#[derive(Default)]
pub struct InMemoryAlertLogRepository {
    state: RwLock<AlertLogState>,
}

impl InMemoryAlertLogRepository {
    pub async fn entries(&self) -> Vec<AlertLogEntry> {
        self.state.read().await.entries.clone()
    }
}

#[async_trait::async_trait]
impl AlertLogRepository for InMemoryAlertLogRepository {
    async fn append(&self, new: NewAlertLogEntry) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let entry = AlertLogEntry {
            id: state.next_id,
            user_id: new.user_id,
            ticket_id: new.ticket_id,
            tag: new.tag,
            kind: new.kind,
            timestamp: new.timestamp,
        };
        state.entries.push(entry);
        Ok(())
    }

    async fn stats_for_user(&self, user_id: i64) -> Result<Vec<AlertStats>, RepositoryError> {
        let cutoff = Utc::now() - Duration::days(14);
        let state = self.state.read().await;

        let mut grouped: BTreeMap<(String, AlertKind, String), i64> = BTreeMap::new();
        for entry in state
            .entries
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.timestamp >= cutoff)
        {
            let key = (
                entry.timestamp.format("%Y-%m-%d").to_string(),
                entry.kind,
                entry.tag.clone(),
            );
            *grouped.entry(key).or_default() += 1;
        }

        Ok(grouped
            .into_iter()
            .map(|((date, kind, tag), count)| AlertStats { date, kind, tag, count })
            .collect())
    }

    async fn count_for(
        &self,
        user_id: i64,
        ticket_id: i64,
        kind: AlertKind,
    ) -> Result<i64, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .iter()
            .filter(|entry| {
                entry.user_id == user_id && entry.ticket_id == ticket_id && entry.kind == kind
            })
            .count() as i64)
    }
}
