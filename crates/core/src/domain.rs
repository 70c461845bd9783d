use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of subscription kinds. Persisted as
/// `new_ticket | ticket_update | sla_deadline`; anything else is rejected at
/// the decode boundary rather than carried around as a stray string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    NewTicket,
    TicketUpdate,
    SlaDeadline,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown alert kind `{0}`")]
pub struct UnknownAlertKind(pub String);

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewTicket => "new_ticket",
            Self::TicketUpdate => "ticket_update",
            Self::SlaDeadline => "sla_deadline",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownAlertKind> {
        match raw {
            "new_ticket" => Ok(Self::NewTicket),
            "ticket_update" => Ok(Self::TicketUpdate),
            "sla_deadline" => Ok(Self::SlaDeadline),
            other => Err(UnknownAlertKind(other.to_owned())),
        }
    }

    /// Header line used in chat alerts for this kind.
    pub fn alert_header(&self) -> &'static str {
        match self {
            Self::NewTicket => "New Ticket Alert",
            Self::TicketUpdate => "Ticket Update Alert",
            Self::SlaDeadline => "SLA Deadline Alert",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownRole> {
        match raw {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

/// A console user. The `slack_user_id` is resolved lazily from the email
/// against the chat service and cached here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub daily_summary: bool,
    pub summary_time: Option<DateTime<Utc>>,
    pub slack_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A standing subscription: "if a ticket with this tag reaches this
/// condition, post to this channel".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagAlert {
    pub id: i64,
    pub user_id: i64,
    pub tag: String,
    pub slack_channel_id: String,
    pub kind: AlertKind,
}

/// Durable dedupe row for SLA alerts, unique by `(user, ticket, kind)`.
/// The stored `breach_at` must equal the help-desk's current breach time;
/// any drift forces eviction before the next dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertCacheEntry {
    pub id: i64,
    pub user_id: i64,
    pub ticket_id: i64,
    pub kind: AlertKind,
    pub breach_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit row for every dispatched alert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlertLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub ticket_id: i64,
    pub tag: String,
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
}

/// Per-day, per-kind, per-tag alert counts for the console dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub date: String,
    pub kind: AlertKind,
    pub tag: String,
    pub count: i64,
}
