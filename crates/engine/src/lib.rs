//! Tagwatch engine - the ticket-polling and alert-dispatch core
//!
//! Three long-lived workers live here:
//! - **Poller** (`poller`) - the 5-minute fetch/match/classify/dedupe loop
//! - **SummaryComposer** (`summary`) - on-demand 24h digests, DM'd via Slack
//! - **SummaryScheduler** (`scheduler`) - fires each user's daily summary
//!
//! All I/O goes through the seams in `core` (`Helpdesk`, `AlertDispatcher`,
//! `ChatDirectory`), so the whole engine runs against scripted fakes in
//! tests. `dispatch` provides the production implementations backed by the
//! Zendesk and Slack clients.

pub mod core;
pub mod dispatch;
pub mod error;
pub mod poller;
pub mod scheduler;
pub mod summary;

pub use crate::core::{
    AlertDispatcher, ChatDirectory, Core, Helpdesk, HelpdeskCredentials, HelpdeskFactory,
    TicketAlert, DAILY_SUMMARY_ENABLED_KEY, REQUIRED_SLACK_KEYS, REQUIRED_ZENDESK_KEYS,
    SLACK_APP_TOKEN_KEY, SLACK_BOT_TOKEN_KEY,
};
pub use dispatch::{ConfigBackedChatSink, SlackChatSink, ZendeskHelpdeskFactory};
pub use error::EngineError;
pub use poller::{CycleOutcome, Poller, CONFIG_GATE_INTERVAL, POLL_INTERVAL};
pub use scheduler::SummaryScheduler;
pub use summary::{SummaryComposer, SummaryOutcome};
