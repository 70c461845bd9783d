use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tagwatch_core::domain::{AlertKind, TagAlert};
use tagwatch_core::notify::Severity;
use tagwatch_core::sla::SlaUrgency;
use tagwatch_core::sse::ServiceState;
use tagwatch_db::repositories::{NewAlertCacheEntry, NewAlertLogEntry, RepositoryError};
use tagwatch_zendesk::{SlaInfo, Ticket};

use crate::core::{Core, Helpdesk, TicketAlert, REQUIRED_SLACK_KEYS, REQUIRED_ZENDESK_KEYS};
use crate::error::EngineError;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const CONFIG_GATE_INTERVAL: Duration = Duration::from_secs(30);

const SERVICE: &str = "zendesk";

/// Result of one poll cycle: how many tickets were examined, and the clock
/// value to record as the next `last_poll_time`.
#[derive(Clone, Copy, Debug)]
pub struct CycleOutcome {
    pub processed: usize,
    pub completed_at: DateTime<Utc>,
}

/// The periodic orchestrator: gate on config readiness, fetch, match,
/// classify, dedupe, dispatch, broadcast. Never panics on remote errors -
/// they are logged, broadcast, and retried next cycle.
pub struct Poller {
    core: Core,
}

impl Poller {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    /// Runs until the token is cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        if !self.wait_for_config(&cancel).await {
            return;
        }
        info!("configuration complete; starting ticket polling");

        // A cold start looks back one interval so recent activity is not lost.
        let mut last_poll = Utc::now() - chrono::Duration::minutes(5);

        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.run_cycle(last_poll, Utc::now()).await {
                Ok(outcome) => {
                    last_poll = outcome.completed_at;
                    info!(processed = outcome.processed, "poll cycle complete");
                }
                Err(error) => {
                    warn!(error = %error, "poll cycle failed");
                    self.core.notifications.push(
                        failure_category(&error),
                        &error.to_string(),
                        error.severity(),
                    );
                    self.core.hub.set_status(
                        SERVICE,
                        ServiceState::Error,
                        Some(&error.to_string()),
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// One fetch/match/dispatch pass. `now` is the classification clock;
    /// the outcome carries the cycle's own end time, which `run` records as
    /// the next `last_poll_time`. Pulled out of `run` so the scenario tests
    /// can drive cycles with explicit clocks.
    pub async fn run_cycle(
        &self,
        last_poll: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, EngineError> {
        self.core.notifications.push(
            "Refreshing Zendesk tickets",
            "Requesting tickets from Zendesk",
            Severity::Info,
        );

        let credentials = self.core.helpdesk_credentials().await?;
        let helpdesk = self.core.helpdesk.open(&credentials)?;

        let (sla_tickets, sla_data) = helpdesk.search_active_sla().await?;
        debug!(count = sla_tickets.len(), "fetched sla tickets");
        let updated_tickets = helpdesk.search_updated_since(last_poll).await?;
        debug!(count = updated_tickets.len(), "fetched new/updated tickets");

        let tickets = dedupe_tickets(sla_tickets, updated_tickets);
        let subscriptions = self.core.tag_alerts.list_all().await?;

        for ticket in &tickets {
            if let Err(error) = self
                .process_ticket(helpdesk.as_ref(), ticket, &subscriptions, &sla_data, last_poll, now)
                .await
            {
                warn!(ticket_id = ticket.id, error = %error, "skipping ticket after failure");
            }
        }

        self.core.notifications.push(
            "Ticket processing complete",
            &format!("Processed {} tickets", tickets.len()),
            Severity::Success,
        );
        self.core.hub.set_status(SERVICE, ServiceState::Connected, None);

        Ok(CycleOutcome { processed: tickets.len(), completed_at: Utc::now() })
    }

    async fn process_ticket(
        &self,
        helpdesk: &dyn Helpdesk,
        ticket: &Ticket,
        subscriptions: &[TagAlert],
        sla_data: &HashMap<i64, SlaInfo>,
        last_poll: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let sla = sla_data.get(&ticket.id);

        for subscription in subscriptions {
            if !tag_matches(&subscription.tag, &ticket.tags) {
                continue;
            }

            let Some(detail) = classify(subscription.kind, ticket, sla, last_poll, now) else {
                continue;
            };

            if subscription.kind == AlertKind::SlaDeadline {
                let breach_at = detail.breach_at.ok_or_else(|| {
                    EngineError::Internal("sla firing without a breach time".to_string())
                })?;

                if !self.sla_fire_allowed(subscription, ticket.id, breach_at).await? {
                    debug!(
                        ticket_id = ticket.id,
                        user_id = subscription.user_id,
                        "suppressing sla alert already sent for this deadline"
                    );
                    continue;
                }

                self.dispatch(helpdesk, ticket, subscription, &detail, now).await?;
                self.record_sla_dispatch(subscription, ticket.id, breach_at).await?;
            } else {
                self.dispatch(helpdesk, ticket, subscription, &detail, now).await?;
            }
        }

        Ok(())
    }

    /// SLA dedupe: a cached row with the same breach time means the alert
    /// already went out; a shifted breach time evicts the row and re-fires.
    async fn sla_fire_allowed(
        &self,
        subscription: &TagAlert,
        ticket_id: i64,
        breach_at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        match self
            .core
            .alert_cache
            .lookup(subscription.user_id, ticket_id, AlertKind::SlaDeadline)
            .await?
        {
            Some(entry) if entry.breach_at.timestamp() == breach_at.timestamp() => Ok(false),
            Some(entry) => {
                self.core.alert_cache.evict(entry.id).await?;
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn record_sla_dispatch(
        &self,
        subscription: &TagAlert,
        ticket_id: i64,
        breach_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let entry = NewAlertCacheEntry {
            user_id: subscription.user_id,
            ticket_id,
            kind: AlertKind::SlaDeadline,
            breach_at,
        };

        match self.core.alert_cache.insert(entry.clone()).await {
            Ok(_) => Ok(()),
            // A concurrent writer got there first; evict the stale row and
            // retry once with the breach time we actually alerted on.
            Err(RepositoryError::Duplicate) => {
                if let Some(existing) = self
                    .core
                    .alert_cache
                    .lookup(subscription.user_id, ticket_id, AlertKind::SlaDeadline)
                    .await?
                {
                    self.core.alert_cache.evict(existing.id).await?;
                }
                self.core.alert_cache.insert(entry).await.map(|_| ()).map_err(EngineError::from)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn dispatch(
        &self,
        helpdesk: &dyn Helpdesk,
        ticket: &Ticket,
        subscription: &TagAlert,
        detail: &FiringDetail,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let (requester, organization) = self.enrich(helpdesk, ticket).await;

        let alert = TicketAlert {
            channel: subscription.slack_channel_id.clone(),
            kind: subscription.kind,
            header: subscription.kind.alert_header().to_string(),
            description: detail.description.clone(),
            ticket_id: ticket.id,
            ticket_url: helpdesk.agent_ticket_url(ticket.id),
            subject: ticket.subject.clone(),
            requester,
            organization,
            tag: subscription.tag.clone(),
            sla_expiration: detail.breach_at,
        };

        self.core.alerts.send_ticket_alert(&alert).await?;
        self.core
            .alert_log
            .append(NewAlertLogEntry {
                user_id: subscription.user_id,
                ticket_id: ticket.id,
                tag: subscription.tag.clone(),
                kind: subscription.kind,
                timestamp: now,
            })
            .await?;

        info!(
            kind = %subscription.kind,
            ticket_id = ticket.id,
            tag = %subscription.tag,
            channel = %subscription.slack_channel_id,
            "alert dispatched"
        );
        Ok(())
    }

    /// Requester/organization names for the alert card. Lookup failures
    /// degrade to placeholders; enrichment never fails a dispatch.
    async fn enrich(&self, helpdesk: &dyn Helpdesk, ticket: &Ticket) -> (String, String) {
        let requester = match ticket.requester_id {
            Some(id) => helpdesk
                .get_user(id)
                .await
                .map(|user| user.name)
                .unwrap_or_else(|_| "Unknown Requester".to_string()),
            None => "Unknown Requester".to_string(),
        };

        let organization = match ticket.organization_id {
            Some(id) => helpdesk
                .get_organization(id)
                .await
                .map(|organization| organization.name)
                .unwrap_or_else(|_| "Unknown Organization".to_string()),
            None => "Unknown Organization".to_string(),
        };

        (requester, organization)
    }

    /// Both service gates must pass before the first fetch; each re-checks
    /// every 30 seconds. Returns `false` only on cancellation.
    async fn wait_for_config(&self, cancel: &CancellationToken) -> bool {
        let (helpdesk_ready, chat_ready) = tokio::join!(
            self.core.wait_for_keys(cancel, "zendesk", REQUIRED_ZENDESK_KEYS),
            self.core.wait_for_keys(cancel, "slack", REQUIRED_SLACK_KEYS),
        );
        helpdesk_ready && chat_ready
    }
}

struct FiringDetail {
    description: String,
    breach_at: Option<DateTime<Utc>>,
}

fn tag_matches(subscription_tag: &str, ticket_tags: &[String]) -> bool {
    ticket_tags.iter().any(|tag| tag == subscription_tag)
}

/// Decide whether a (ticket, subscription) pair fires. Only the first
/// active policy metric is consulted for SLA deadlines.
fn classify(
    kind: AlertKind,
    ticket: &Ticket,
    sla: Option<&SlaInfo>,
    last_poll: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<FiringDetail> {
    let active_breach = sla.and_then(SlaInfo::first_active).and_then(|metric| metric.breach_at);

    match kind {
        AlertKind::NewTicket => (ticket.created_at > last_poll).then(|| FiringDetail {
            description: "A new ticket matched this tag subscription.".to_string(),
            breach_at: active_breach,
        }),
        AlertKind::TicketUpdate => (ticket.updated_at > last_poll).then(|| FiringDetail {
            description: "A subscribed ticket was updated.".to_string(),
            breach_at: active_breach,
        }),
        AlertKind::SlaDeadline => {
            let breach_at = active_breach?;
            let urgency = SlaUrgency::classify(breach_at - now)?;
            Some(FiringDetail {
                description: urgency.label().to_string(),
                breach_at: Some(breach_at),
            })
        }
    }
}

fn failure_category(error: &EngineError) -> &'static str {
    match error {
        EngineError::ConfigMissing(_) => "Zendesk Configuration Error",
        EngineError::AuthRejected(_) => "Zendesk Authentication Error",
        EngineError::Parse(_) => "Zendesk Parse Error",
        _ => "Zendesk Connectivity Error",
    }
}

/// Union of the two search results, first occurrence of a ticket id wins.
fn dedupe_tickets(primary: Vec<Ticket>, secondary: Vec<Ticket>) -> Vec<Ticket> {
    let mut seen = HashSet::new();
    let mut tickets = Vec::with_capacity(primary.len() + secondary.len());

    for ticket in primary.into_iter().chain(secondary) {
        if seen.insert(ticket.id) {
            tickets.push(ticket);
        }
    }

    tickets
}
