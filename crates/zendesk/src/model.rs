use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A help-desk ticket as returned by the search API. Tickets are transient
/// per poll cycle and never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requester_id: Option<i64>,
    #[serde(default)]
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub via: Via,
}

impl Ticket {
    /// Email address of whoever last touched the ticket, when known.
    pub fn via_address(&self) -> Option<&str> {
        self.via.source.from.address.as_deref()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Via {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub source: ViaSource,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViaSource {
    #[serde(default)]
    pub from: ViaAddress,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViaAddress {
    #[serde(default)]
    pub address: Option<String>,
}

/// Lifecycle stage of an SLA policy metric. Only `active` metrics are
/// actionable for alerting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaStage {
    Active,
    Paused,
    Fulfilled,
    Breached,
}

/// A per-ticket deadline for a service-level goal (first reply, next reply,
/// resolution, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicyMetric {
    #[serde(default)]
    pub metric: String,
    pub stage: SlaStage,
    #[serde(default)]
    pub breach_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub days: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaInfo {
    pub policy_metrics: Vec<SlaPolicyMetric>,
}

impl SlaInfo {
    /// The first active metric, the only one the alert engine consults.
    pub fn first_active(&self) -> Option<&SlaPolicyMetric> {
        self.policy_metrics.iter().find(|metric| metric.stage == SlaStage::Active)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatisfactionRating {
    pub id: i64,
    #[serde(default)]
    pub ticket_id: Option<i64>,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZendeskUser {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}
