//! Scripted fakes shared by the engine integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tagwatch_core::notify::NotificationBus;
use tagwatch_core::sse::SseHub;
use tagwatch_db::repositories::{
    InMemoryAlertCacheRepository, InMemoryAlertLogRepository, InMemoryConfigRepository,
    InMemoryTagAlertRepository, InMemoryUserRepository,
};
use tagwatch_engine::{
    AlertDispatcher, ChatDirectory, Core, EngineError, Helpdesk, HelpdeskCredentials,
    HelpdeskFactory, TicketAlert,
};
use tagwatch_slack::blocks::MessageTemplate;
use tagwatch_zendesk::{
    Organization, SatisfactionRating, SlaInfo, SlaPolicyMetric, SlaStage, Ticket, Via, ViaAddress,
    ViaSource, ZendeskUser,
};

#[derive(Default)]
pub struct HelpdeskState {
    pub sla_tickets: Vec<Ticket>,
    pub sla_data: HashMap<i64, SlaInfo>,
    pub updated_tickets: Vec<Ticket>,
    pub assigned_tickets: Vec<Ticket>,
    pub users_by_email: HashMap<String, ZendeskUser>,
    pub ratings: Vec<SatisfactionRating>,
}

/// Scripted help-desk: tests mutate the state between cycles.
#[derive(Default)]
pub struct ScriptedHelpdesk {
    pub state: Mutex<HelpdeskState>,
}

impl ScriptedHelpdesk {
    pub async fn set_sla(&self, tickets: Vec<Ticket>, sla_data: HashMap<i64, SlaInfo>) {
        let mut state = self.state.lock().await;
        state.sla_tickets = tickets;
        state.sla_data = sla_data;
    }

    pub async fn set_updated(&self, tickets: Vec<Ticket>) {
        self.state.lock().await.updated_tickets = tickets;
    }
}

#[async_trait]
impl Helpdesk for ScriptedHelpdesk {
    async fn search_active_sla(
        &self,
    ) -> Result<(Vec<Ticket>, HashMap<i64, SlaInfo>), EngineError> {
        let state = self.state.lock().await;
        Ok((state.sla_tickets.clone(), state.sla_data.clone()))
    }

    async fn search_updated_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, EngineError> {
        Ok(self.state.lock().await.updated_tickets.clone())
    }

    async fn search_assigned_to(
        &self,
        _user_id: i64,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, EngineError> {
        Ok(self.state.lock().await.assigned_tickets.clone())
    }

    async fn get_user(&self, user_id: i64) -> Result<ZendeskUser, EngineError> {
        Ok(ZendeskUser { id: user_id, name: "Pat Doe".to_string(), email: None })
    }

    async fn get_organization(&self, organization_id: i64) -> Result<Organization, EngineError> {
        Ok(Organization { id: organization_id, name: "Acme".to_string() })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<ZendeskUser, EngineError> {
        self.state
            .lock()
            .await
            .users_by_email
            .get(email)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("zendesk user `{email}`")))
    }

    async fn csat_since(
        &self,
        _user_id: i64,
        _since: DateTime<Utc>,
    ) -> Result<Vec<SatisfactionRating>, EngineError> {
        Ok(self.state.lock().await.ratings.clone())
    }

    fn agent_ticket_url(&self, ticket_id: i64) -> String {
        format!("https://acme.zendesk.com/agent/tickets/{ticket_id}")
    }
}

pub struct ScriptedHelpdeskFactory {
    pub helpdesk: Arc<ScriptedHelpdesk>,
    pub opened_with: std::sync::Mutex<Vec<HelpdeskCredentials>>,
}

impl ScriptedHelpdeskFactory {
    pub fn new(helpdesk: Arc<ScriptedHelpdesk>) -> Self {
        Self { helpdesk, opened_with: std::sync::Mutex::new(Vec::new()) }
    }
}

impl HelpdeskFactory for ScriptedHelpdeskFactory {
    fn open(&self, credentials: &HelpdeskCredentials) -> Result<Arc<dyn Helpdesk>, EngineError> {
        self.opened_with.lock().expect("factory lock").push(credentials.clone());
        Ok(self.helpdesk.clone())
    }
}

/// Records alerts and DMs instead of talking to Slack.
#[derive(Default)]
pub struct RecordingChat {
    pub alerts: Mutex<Vec<TicketAlert>>,
    pub dms: Mutex<Vec<(String, MessageTemplate)>>,
    pub resolves: Mutex<Vec<String>>,
}

#[async_trait]
impl AlertDispatcher for RecordingChat {
    async fn send_ticket_alert(&self, alert: &TicketAlert) -> Result<(), EngineError> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for RecordingChat {
    async fn resolve_user_by_email(&self, email: &str) -> Result<String, EngineError> {
        self.resolves.lock().await.push(email.to_string());
        Ok("U-resolved".to_string())
    }

    async fn send_dm(
        &self,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), EngineError> {
        self.dms.lock().await.push((user_id.to_string(), message.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub core: Core,
    pub helpdesk: Arc<ScriptedHelpdesk>,
    pub chat: Arc<RecordingChat>,
    pub config: Arc<InMemoryConfigRepository>,
    pub users: Arc<InMemoryUserRepository>,
    pub tag_alerts: Arc<InMemoryTagAlertRepository>,
    pub alert_cache: Arc<InMemoryAlertCacheRepository>,
    pub alert_log: Arc<InMemoryAlertLogRepository>,
    pub hub: Arc<SseHub>,
    pub notifications: Arc<NotificationBus>,
}

pub fn harness() -> Harness {
    let config = Arc::new(InMemoryConfigRepository::with_entries([
        ("zendesk_subdomain", "acme"),
        ("zendesk_email", "ops@acme.test"),
        ("zendesk_api_key", "zd-token"),
        ("slack_bot_token", "xoxb-test"),
        ("slack_app_token", "xapp-test"),
    ]));
    let users = Arc::new(InMemoryUserRepository::default());
    let tag_alerts = Arc::new(InMemoryTagAlertRepository::default());
    let alert_cache = Arc::new(InMemoryAlertCacheRepository::default());
    let alert_log = Arc::new(InMemoryAlertLogRepository::default());
    let helpdesk = Arc::new(ScriptedHelpdesk::default());
    let chat = Arc::new(RecordingChat::default());
    let hub = Arc::new(SseHub::new());
    let notifications = Arc::new(NotificationBus::new(hub.clone()));

    let core = Core {
        config: config.clone(),
        users: users.clone(),
        tag_alerts: tag_alerts.clone(),
        alert_cache: alert_cache.clone(),
        alert_log: alert_log.clone(),
        helpdesk: Arc::new(ScriptedHelpdeskFactory::new(helpdesk.clone())),
        alerts: chat.clone(),
        chat: chat.clone(),
        hub: hub.clone(),
        notifications: notifications.clone(),
    };

    Harness {
        core,
        helpdesk,
        chat,
        config,
        users,
        tag_alerts,
        alert_cache,
        alert_log,
        hub,
        notifications,
    }
}

pub fn ticket(id: i64, tags: &[&str], created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Ticket {
    Ticket {
        id,
        url: format!("https://acme.zendesk.com/api/v2/tickets/{id}.json"),
        subject: format!("Ticket {id}"),
        description: "Something went wrong".to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        requester_id: Some(900),
        organization_id: Some(500),
        assignee_id: None,
        created_at,
        updated_at,
        via: Via {
            channel: "email".to_string(),
            source: ViaSource { from: ViaAddress { address: Some("customer@example.test".into()) } },
        },
    }
}

pub fn active_sla(breach_at: DateTime<Utc>) -> SlaInfo {
    SlaInfo {
        policy_metrics: vec![SlaPolicyMetric {
            metric: "next_reply_time".to_string(),
            stage: SlaStage::Active,
            breach_at: Some(breach_at),
            hours: 0,
            minutes: 0,
            days: 0,
        }],
    }
}

pub fn paused_then_active_sla(
    paused_breach: DateTime<Utc>,
    active_breach: DateTime<Utc>,
) -> SlaInfo {
    SlaInfo {
        policy_metrics: vec![
            SlaPolicyMetric {
                metric: "next_reply_time".to_string(),
                stage: SlaStage::Paused,
                breach_at: Some(paused_breach),
                hours: 0,
                minutes: 0,
                days: 0,
            },
            SlaPolicyMetric {
                metric: "resolution_time".to_string(),
                stage: SlaStage::Active,
                breach_at: Some(active_breach),
                hours: 0,
                minutes: 0,
                days: 0,
            },
        ],
    }
}
