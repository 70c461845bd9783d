use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tagwatch_core::domain::AlertKind;
use tagwatch_core::notify::NotificationBus;
use tagwatch_core::sse::SseHub;
use tagwatch_db::repositories::{
    AlertCacheRepository, AlertLogRepository, ConfigRepository, TagAlertRepository, UserRepository,
};
use tagwatch_slack::blocks::MessageTemplate;
use tagwatch_zendesk::{Organization, SatisfactionRating, SlaInfo, Ticket, ZendeskUser};

use crate::error::EngineError;

pub const ZENDESK_SUBDOMAIN_KEY: &str = "zendesk_subdomain";
pub const ZENDESK_EMAIL_KEY: &str = "zendesk_email";
pub const ZENDESK_API_KEY: &str = "zendesk_api_key";
pub const SLACK_BOT_TOKEN_KEY: &str = "slack_bot_token";
pub const SLACK_APP_TOKEN_KEY: &str = "slack_app_token";
pub const DAILY_SUMMARY_ENABLED_KEY: &str = "daily_summary_enabled";

/// Keys the help-desk gate requires before the fetch loop may start.
pub const REQUIRED_ZENDESK_KEYS: &[&str] =
    &[ZENDESK_SUBDOMAIN_KEY, ZENDESK_EMAIL_KEY, ZENDESK_API_KEY];

/// Keys the chat gate requires.
pub const REQUIRED_SLACK_KEYS: &[&str] = &[SLACK_BOT_TOKEN_KEY, SLACK_APP_TOKEN_KEY];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpdeskCredentials {
    pub subdomain: String,
    pub email: String,
    pub api_token: String,
}

/// The help-desk operations the engine consumes. The production
/// implementation is a Zendesk client; tests script this.
#[async_trait]
pub trait Helpdesk: Send + Sync {
    async fn search_active_sla(
        &self,
    ) -> Result<(Vec<Ticket>, HashMap<i64, SlaInfo>), EngineError>;
    async fn search_updated_since(&self, since: DateTime<Utc>)
        -> Result<Vec<Ticket>, EngineError>;
    async fn search_assigned_to(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, EngineError>;
    async fn get_user(&self, user_id: i64) -> Result<ZendeskUser, EngineError>;
    async fn get_organization(&self, organization_id: i64) -> Result<Organization, EngineError>;
    async fn find_user_by_email(&self, email: &str) -> Result<ZendeskUser, EngineError>;
    async fn csat_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<SatisfactionRating>, EngineError>;
    fn agent_ticket_url(&self, ticket_id: i64) -> String;
}

/// Credentials are re-read from the config store every cycle, so the engine
/// opens a fresh help-desk connection per cycle through this factory.
pub trait HelpdeskFactory: Send + Sync {
    fn open(&self, credentials: &HelpdeskCredentials) -> Result<Arc<dyn Helpdesk>, EngineError>;
}

/// A fully-resolved alert ready for chat dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct TicketAlert {
    pub channel: String,
    pub kind: AlertKind,
    pub header: String,
    pub description: String,
    pub ticket_id: i64,
    pub ticket_url: String,
    pub subject: String,
    pub requester: String,
    pub organization: String,
    pub tag: String,
    pub sla_expiration: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send_ticket_alert(&self, alert: &TicketAlert) -> Result<(), EngineError>;
}

/// Chat-side user resolution and direct messages (summary delivery).
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn resolve_user_by_email(&self, email: &str) -> Result<String, EngineError>;
    async fn send_dm(&self, user_id: &str, message: &MessageTemplate)
        -> Result<(), EngineError>;
}

/// Every dependency the workers share, constructed once at bootstrap and
/// passed into each worker. No global mutable state.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<dyn ConfigRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tag_alerts: Arc<dyn TagAlertRepository>,
    pub alert_cache: Arc<dyn AlertCacheRepository>,
    pub alert_log: Arc<dyn AlertLogRepository>,
    pub helpdesk: Arc<dyn HelpdeskFactory>,
    pub alerts: Arc<dyn AlertDispatcher>,
    pub chat: Arc<dyn ChatDirectory>,
    pub hub: Arc<SseHub>,
    pub notifications: Arc<NotificationBus>,
}

impl Core {
    /// True when every key is present and non-empty. Read failures count as
    /// not ready; the gate retries anyway.
    pub async fn keys_ready(&self, keys: &[&str]) -> bool {
        for key in keys {
            match self.config.get(key).await {
                Ok(Some(value)) if !value.trim().is_empty() => {}
                Ok(_) => return false,
                Err(error) => {
                    tracing::warn!(key, error = %error, "config read failed during gate");
                    return false;
                }
            }
        }
        true
    }

    /// Block until the keys are all configured, re-checking every 30 s.
    /// Returns `false` only when cancelled.
    pub async fn wait_for_keys(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
        service: &str,
        keys: &[&str],
    ) -> bool {
        loop {
            if self.keys_ready(keys).await {
                tracing::info!(service, "configuration gate passed");
                return true;
            }

            tracing::info!(service, "waiting for complete configuration");
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(crate::poller::CONFIG_GATE_INTERVAL) => {}
            }
        }
    }

    /// Read a non-empty configuration value or fail with `ConfigMissing`.
    pub async fn require_config(&self, key: &str) -> Result<String, EngineError> {
        self.config
            .get(key)
            .await
            .map_err(EngineError::from)?
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| EngineError::ConfigMissing(key.to_string()))
    }

    pub async fn helpdesk_credentials(&self) -> Result<HelpdeskCredentials, EngineError> {
        Ok(HelpdeskCredentials {
            subdomain: self.require_config(ZENDESK_SUBDOMAIN_KEY).await?,
            email: self.require_config(ZENDESK_EMAIL_KEY).await?,
            api_token: self.require_config(ZENDESK_API_KEY).await?,
        })
    }
}
