use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{
    Organization, SatisfactionRating, SlaInfo, SlaPolicyMetric, SlaStage, Ticket, ZendeskUser,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ZendeskError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("zendesk rejected credentials: {0}")]
    AuthRejected(StatusCode),
    #[error("zendesk returned status {0}")]
    Status(StatusCode),
    #[error("failed to parse zendesk response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no zendesk user found with email `{0}`")]
    UserNotFound(String),
}

pub struct ZendeskClient {
    subdomain: String,
    email: String,
    api_token: SecretString,
    client: reqwest::Client,
}

impl ZendeskClient {
    pub fn new(
        subdomain: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, ZendeskError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            subdomain: subdomain.into(),
            email: email.into(),
            api_token: api_token.into().into(),
            client,
        })
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// Console deep link for a ticket, used in chat alerts.
    pub fn agent_ticket_url(&self, ticket_id: i64) -> String {
        format!("https://{}.zendesk.com/agent/tickets/{}", self.subdomain, ticket_id)
    }

    fn api_url(&self, path: &str) -> String {
        format!("https://{}.zendesk.com/api/v2/{path}", self.subdomain)
    }

    async fn get_body(&self, url: &str, query: &[(&str, &str)]) -> Result<String, ZendeskError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(format!("{}/token", self.email), Some(self.api_token.expose_secret()))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ZendeskError::AuthRejected(status));
        }
        if !status.is_success() {
            return Err(ZendeskError::Status(status));
        }

        Ok(response.text().await?)
    }

    /// All tickets with status below pending, plus the active SLA policy
    /// metrics sideloaded per ticket. Follows the `next_page` cursor until
    /// exhausted; tickets without active metrics still appear in the list.
    pub async fn search_active_sla(
        &self,
    ) -> Result<(Vec<Ticket>, HashMap<i64, SlaInfo>), ZendeskError> {
        let mut tickets = Vec::new();
        let mut sla_data: HashMap<i64, SlaInfo> = HashMap::new();

        let mut endpoint = self.api_url("search.json");
        let mut query: Vec<(&str, &str)> =
            vec![("query", "type:ticket status<pending"), ("include", "tickets(slas)")];

        loop {
            let body = self.get_body(&endpoint, &query).await?;
            let page = parse_sla_page(&body)?;

            debug!(count = page.tickets.len(), "fetched sla ticket page");
            sla_data.extend(page.sla_data);
            tickets.extend(page.tickets);

            match page.next_page {
                // The cursor is a complete URL carrying its own parameters.
                Some(next) => {
                    endpoint = next;
                    query = Vec::new();
                }
                None => break,
            }
        }

        Ok((tickets, sla_data))
    }

    /// Tickets touched since `since` (inclusive search, help-desk side).
    pub async fn search_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, ZendeskError> {
        let query = format!("type:ticket updated>{}", format_search_time(since));
        self.search_tickets(&query).await
    }

    /// Tickets assigned to a help-desk user, touched since `since`.
    pub async fn search_assigned_to(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, ZendeskError> {
        let query =
            format!("type:ticket assignee_id:{user_id} updated>{}", format_search_time(since));
        self.search_tickets(&query).await
    }

    async fn search_tickets(&self, search_query: &str) -> Result<Vec<Ticket>, ZendeskError> {
        let mut tickets = Vec::new();

        let mut endpoint = self.api_url("search.json");
        let mut query: Vec<(&str, &str)> = vec![("query", search_query)];

        loop {
            let body = self.get_body(&endpoint, &query).await?;
            let page = parse_ticket_page(&body)?;
            tickets.extend(page.tickets);

            match page.next_page {
                Some(next) => {
                    endpoint = next;
                    query = Vec::new();
                }
                None => break,
            }
        }

        Ok(tickets)
    }

    /// Single-record fetch used for message enrichment. A missing record
    /// degrades to a placeholder instead of failing the caller.
    pub async fn get_user(&self, user_id: i64) -> Result<ZendeskUser, ZendeskError> {
        let url = self.api_url(&format!("users/{user_id}.json"));
        match self.get_body(&url, &[]).await {
            Ok(body) => {
                let envelope: UserEnvelope = serde_json::from_str(&body)?;
                Ok(envelope.user)
            }
            Err(ZendeskError::Status(StatusCode::NOT_FOUND)) => Ok(ZendeskUser {
                id: user_id,
                name: "Unknown Requester".to_string(),
                email: None,
            }),
            Err(error) => Err(error),
        }
    }

    pub async fn get_organization(
        &self,
        organization_id: i64,
    ) -> Result<Organization, ZendeskError> {
        let url = self.api_url(&format!("organizations/{organization_id}.json"));
        match self.get_body(&url, &[]).await {
            Ok(body) => {
                let envelope: OrganizationEnvelope = serde_json::from_str(&body)?;
                Ok(envelope.organization)
            }
            Err(ZendeskError::Status(StatusCode::NOT_FOUND)) => {
                Ok(Organization { id: organization_id, name: "Unknown Organization".to_string() })
            }
            Err(error) => Err(error),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<ZendeskUser, ZendeskError> {
        let query = format!("type:user email:{email}");
        let body =
            self.get_body(&self.api_url("search.json"), &[("query", query.as_str())]).await?;

        let envelope: UserSearchEnvelope = serde_json::from_str(&body)?;
        envelope
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ZendeskError::UserNotFound(email.to_string()))
    }

    /// Satisfaction ratings offered on the user's tickets since `since`.
    pub async fn csat_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<SatisfactionRating>, ZendeskError> {
        let search_query = format!(
            "type:ticket assignee_id:{user_id} satisfaction_rating:offered updated>{}",
            format_search_time(since)
        );

        let mut ratings = Vec::new();
        let mut endpoint = self.api_url("search.json");
        let mut query: Vec<(&str, &str)> = vec![("query", search_query.as_str())];

        loop {
            let body = self.get_body(&endpoint, &query).await?;
            let page: RatingSearchEnvelope = serde_json::from_str(&body)?;
            ratings.extend(page.results);

            match page.next_page {
                Some(next) => {
                    endpoint = next;
                    query = Vec::new();
                }
                None => break,
            }
        }

        Ok(ratings)
    }
}

fn format_search_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

struct SlaPage {
    tickets: Vec<Ticket>,
    sla_data: HashMap<i64, SlaInfo>,
    next_page: Option<String>,
}

struct TicketPage {
    tickets: Vec<Ticket>,
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct SlaSearchEnvelope {
    #[serde(default)]
    results: Vec<SlaTicketResult>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct SlaTicketResult {
    #[serde(flatten)]
    ticket: Ticket,
    #[serde(default)]
    slas: SlaSideload,
}

#[derive(Default, Deserialize)]
struct SlaSideload {
    #[serde(default)]
    policy_metrics: Vec<SlaPolicyMetric>,
}

#[derive(Deserialize)]
struct TicketSearchEnvelope {
    #[serde(default)]
    results: Vec<Ticket>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct RatingSearchEnvelope {
    #[serde(default)]
    results: Vec<SatisfactionRating>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: ZendeskUser,
}

#[derive(Deserialize)]
struct OrganizationEnvelope {
    organization: Organization,
}

#[derive(Deserialize)]
struct UserSearchEnvelope {
    #[serde(default)]
    results: Vec<ZendeskUser>,
}

/// Decode one page of the active-SLA search, keeping only `active` metrics
/// in the sideload map.
fn parse_sla_page(body: &str) -> Result<SlaPage, ZendeskError> {
    let envelope: SlaSearchEnvelope = serde_json::from_str(body)?;

    let mut tickets = Vec::with_capacity(envelope.results.len());
    let mut sla_data = HashMap::new();

    for result in envelope.results {
        let active: Vec<SlaPolicyMetric> = result
            .slas
            .policy_metrics
            .into_iter()
            .filter(|metric| metric.stage == SlaStage::Active)
            .collect();

        if !active.is_empty() {
            sla_data.insert(result.ticket.id, SlaInfo { policy_metrics: active });
        }
        tickets.push(result.ticket);
    }

    Ok(SlaPage { tickets, sla_data, next_page: envelope.next_page })
}

fn parse_ticket_page(body: &str) -> Result<TicketPage, ZendeskError> {
    let envelope: TicketSearchEnvelope = serde_json::from_str(body)?;
    Ok(TicketPage { tickets: envelope.results, next_page: envelope.next_page })
}

#[cfg(test)]
mod tests {
    use super::{format_search_time, parse_sla_page, parse_ticket_page};
    use chrono::{TimeZone, Utc};

    const SLA_PAGE: &str = r#"{
        "results": [
            {
                "id": 42,
                "subject": "Printer on fire",
                "tags": ["urgent", "hardware"],
                "created_at": "2026-08-01T10:00:00Z",
                "updated_at": "2026-08-01T12:00:00Z",
                "slas": {
                    "policy_metrics": [
                        {"metric": "next_reply_time", "stage": "active", "breach_at": "2026-08-01T13:00:00Z"},
                        {"metric": "resolution_time", "stage": "paused", "breach_at": "2026-08-02T13:00:00Z"}
                    ]
                }
            },
            {
                "id": 43,
                "subject": "Question about billing",
                "tags": ["billing"],
                "created_at": "2026-08-01T11:00:00Z",
                "updated_at": "2026-08-01T11:30:00Z",
                "slas": {
                    "policy_metrics": [
                        {"metric": "first_reply_time", "stage": "fulfilled", "breach_at": null}
                    ]
                }
            }
        ],
        "next_page": "https://acme.zendesk.com/api/v2/search.json?page=2"
    }"#;

    #[test]
    fn sla_page_keeps_only_active_metrics() {
        let page = parse_sla_page(SLA_PAGE).expect("parse");

        assert_eq!(page.tickets.len(), 2, "every ticket survives the filter");
        assert_eq!(page.next_page.as_deref(), Some("https://acme.zendesk.com/api/v2/search.json?page=2"));

        let info = page.sla_data.get(&42).expect("ticket 42 has active sla");
        assert_eq!(info.policy_metrics.len(), 1);
        assert_eq!(info.policy_metrics[0].metric, "next_reply_time");

        assert!(!page.sla_data.contains_key(&43), "fulfilled-only ticket has no sla entry");
    }

    #[test]
    fn ticket_page_without_next_page_terminates() {
        let page = parse_ticket_page(
            r#"{"results": [{"id": 7, "created_at": "2026-08-01T10:00:00Z", "updated_at": "2026-08-01T10:05:00Z"}]}"#,
        )
        .expect("parse");

        assert_eq!(page.tickets.len(), 1);
        assert_eq!(page.tickets[0].id, 7);
        assert!(page.next_page.is_none());
    }

    #[test]
    fn empty_result_page_is_tolerated() {
        let page = parse_ticket_page(r#"{"results": []}"#).expect("parse");
        assert!(page.tickets.is_empty());

        let sla_page = parse_sla_page(r#"{}"#).expect("parse");
        assert!(sla_page.tickets.is_empty());
        assert!(sla_page.sla_data.is_empty());
    }

    #[test]
    fn malformed_body_is_a_parse_error() {
        let error = parse_ticket_page("<html>gateway timeout</html>").err().expect("parse error");
        assert!(matches!(error, super::ZendeskError::Parse(_)));
    }

    #[test]
    fn search_time_is_compact_rfc3339() {
        let at = Utc.with_ymd_and_hms(2026, 8, 1, 9, 30, 0).unwrap();
        assert_eq!(format_search_time(at), "2026-08-01T09:30:00Z");
    }

    #[test]
    fn agent_ticket_url_points_at_the_console() {
        let client = super::ZendeskClient::new("acme", "ops@acme.test", "token").expect("client");
        assert_eq!(client.agent_ticket_url(42), "https://acme.zendesk.com/agent/tickets/42");
    }
}
