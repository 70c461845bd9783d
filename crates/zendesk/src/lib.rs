//! Help-desk API client
//!
//! Thin wrapper around the Zendesk REST API:
//! - **Search** with `next_page` cursor pagination and SLA sideloading
//! - **Record fetches** (users, organizations) that degrade to placeholders
//! - **CSAT queries** for the daily summary
//!
//! All requests use basic auth (`{email}/token` : api token) and a 10 second
//! timeout. Credentials come from the runtime config store, so callers build
//! a fresh client per poll cycle.

pub mod client;
pub mod model;

pub use client::{ZendeskClient, ZendeskError};
pub use model::{
    Organization, SatisfactionRating, SlaInfo, SlaPolicyMetric, SlaStage, Ticket, Via, ViaAddress,
    ViaSource, ZendeskUser,
};
