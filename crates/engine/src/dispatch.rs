//! Production implementations of the engine seams, backed by the Zendesk and
//! Slack clients.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tagwatch_slack::blocks::MessageTemplate;
use tagwatch_slack::{ticket_alert_message, SlackApiClient, TicketAlertView};
use tagwatch_zendesk::{
    Organization, SatisfactionRating, SlaInfo, Ticket, ZendeskClient, ZendeskUser,
};

use tagwatch_db::repositories::ConfigRepository;

use crate::core::{
    AlertDispatcher, ChatDirectory, Helpdesk, HelpdeskCredentials, HelpdeskFactory, TicketAlert,
    SLACK_BOT_TOKEN_KEY,
};
use crate::error::EngineError;

pub struct ZendeskHelpdeskFactory;

impl HelpdeskFactory for ZendeskHelpdeskFactory {
    fn open(&self, credentials: &HelpdeskCredentials) -> Result<Arc<dyn Helpdesk>, EngineError> {
        let client = ZendeskClient::new(
            credentials.subdomain.clone(),
            credentials.email.clone(),
            credentials.api_token.clone(),
        )?;
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl Helpdesk for ZendeskClient {
    async fn search_active_sla(
        &self,
    ) -> Result<(Vec<Ticket>, HashMap<i64, SlaInfo>), EngineError> {
        Ok(ZendeskClient::search_active_sla(self).await?)
    }

    async fn search_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, EngineError> {
        Ok(ZendeskClient::search_updated_since(self, since).await?)
    }

    async fn search_assigned_to(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, EngineError> {
        Ok(ZendeskClient::search_assigned_to(self, user_id, since).await?)
    }

    async fn get_user(&self, user_id: i64) -> Result<ZendeskUser, EngineError> {
        Ok(ZendeskClient::get_user(self, user_id).await?)
    }

    async fn get_organization(&self, organization_id: i64) -> Result<Organization, EngineError> {
        Ok(ZendeskClient::get_organization(self, organization_id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<ZendeskUser, EngineError> {
        Ok(ZendeskClient::find_user_by_email(self, email).await?)
    }

    async fn csat_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<SatisfactionRating>, EngineError> {
        Ok(ZendeskClient::csat_since(self, user_id, since).await?)
    }

    fn agent_ticket_url(&self, ticket_id: i64) -> String {
        ZendeskClient::agent_ticket_url(self, ticket_id)
    }
}

/// Slack-backed alert dispatch and DM delivery.
pub struct SlackChatSink {
    api: Arc<SlackApiClient>,
}

impl SlackChatSink {
    pub fn new(api: Arc<SlackApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AlertDispatcher for SlackChatSink {
    async fn send_ticket_alert(&self, alert: &TicketAlert) -> Result<(), EngineError> {
        let view = TicketAlertView {
            header: alert.header.clone(),
            description: alert.description.clone(),
            ticket_id: alert.ticket_id,
            ticket_url: alert.ticket_url.clone(),
            subject: alert.subject.clone(),
            requester: alert.requester.clone(),
            organization: alert.organization.clone(),
            tag: alert.tag.clone(),
            sla_expiration: alert.sla_expiration,
        };

        self.api.post_message(&alert.channel, &ticket_alert_message(&view)).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for SlackChatSink {
    async fn resolve_user_by_email(&self, email: &str) -> Result<String, EngineError> {
        Ok(self.api.lookup_user_by_email(email).await?)
    }

    async fn send_dm(
        &self,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), EngineError> {
        Ok(self.api.send_dm(user_id, message).await?)
    }
}

/// Chat sink that re-reads the bot token from the config store on every
/// call, so a rotated token takes effect without a restart.
pub struct ConfigBackedChatSink {
    config: Arc<dyn ConfigRepository>,
}

impl ConfigBackedChatSink {
    pub fn new(config: Arc<dyn ConfigRepository>) -> Self {
        Self { config }
    }

    async fn open(&self) -> Result<SlackChatSink, EngineError> {
        let token = self
            .config
            .get(SLACK_BOT_TOKEN_KEY)
            .await
            .map_err(EngineError::from)?
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| EngineError::ConfigMissing(SLACK_BOT_TOKEN_KEY.to_string()))?;

        Ok(SlackChatSink::new(Arc::new(SlackApiClient::new(token)?)))
    }
}

#[async_trait]
impl AlertDispatcher for ConfigBackedChatSink {
    async fn send_ticket_alert(&self, alert: &TicketAlert) -> Result<(), EngineError> {
        self.open().await?.send_ticket_alert(alert).await
    }
}

#[async_trait]
impl ChatDirectory for ConfigBackedChatSink {
    async fn resolve_user_by_email(&self, email: &str) -> Result<String, EngineError> {
        self.open().await?.resolve_user_by_email(email).await
    }

    async fn send_dm(
        &self,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), EngineError> {
        self.open().await?.send_dm(user_id, message).await
    }
}
