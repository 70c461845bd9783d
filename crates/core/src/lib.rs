//! Tagwatch core - configuration, domain types, and in-process fan-out
//!
//! This crate holds everything the workers share without touching I/O:
//! - **Configuration** (`config`) - process-level config with file/env layering
//! - **Domain** (`domain`) - alert kinds, users, subscriptions, cache/log rows
//! - **SLA classification** (`sla`) - deadline threshold bands
//! - **SSE hub** (`sse`) - single-writer/many-reader broadcast with status replay
//! - **Notification bus** (`notify`) - process-lifetime admin notifications

// Re-export chrono for downstream crates that need DateTime types
pub use chrono;

pub mod config;
pub mod domain;
pub mod notify;
pub mod sla;
pub mod sse;

pub use domain::{
    AlertCacheEntry, AlertKind, AlertLogEntry, AlertStats, Role, TagAlert, User,
};
pub use notify::{Notification, NotificationBus, Severity};
pub use sla::SlaUrgency;
pub use sse::{ServiceState, ServiceStatus, SseHub, SseSubscription};
