//! Slack integration - alert delivery and Socket Mode interactions
//!
//! This crate provides the chat interface for tagwatch:
//! - **Block Kit** (`blocks`) - typed builders for ticket alerts and summaries
//! - **REST API** (`api`) - bot-token calls (post, update, DM, channel list)
//! - **Socket Mode** (`socket`) - WebSocket event loop with reconnection
//! - **Events** (`events`) - interaction envelopes + the acknowledge flow
//!
//! # Getting Started
//!
//! 1. Create a Slack app and enable Socket Mode
//! 2. Grant the bot `chat:write`, `channels:read`, `groups:read`,
//!    `users:read.email`, `im:write`
//! 3. Store `slack_bot_token` / `slack_app_token` in the configuration table
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop, reports status over SSE
//! - `SlackApiClient` - REST calls with `ok`/`error` envelope handling
//! - `AcknowledgeHandler` - rewrites an alert in place when acknowledged

pub mod api;
pub mod blocks;
pub mod events;
pub mod socket;

pub use api::{Channel, SlackApiClient, SlackError};
pub use blocks::{ticket_alert_message, MessageTemplate, TicketAlertView};
pub use events::{AcknowledgeHandler, BlockActionEvent, InteractionHandler, SocketFrame};
pub use socket::{SocketModeRunner, SocketTransport, WebSocketTransport};
