use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::api::{SlackApiClient, SlackError};
use crate::blocks::{acknowledged_context_block, ACKNOWLEDGE_ACTION_ID};

/// One frame off the Socket Mode transport.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: Option<String> },
    Envelope(SocketEnvelope),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SocketEnvelope {
    pub envelope_id: String,
    pub event: SocketEvent,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SocketEvent {
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

/// An interactive button press, carrying enough of the original message to
/// edit it in place.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub user_id: String,
    pub action_id: String,
    pub value: Option<String>,
    pub message_blocks: Vec<Value>,
}

#[derive(Debug, Error)]
pub enum FrameParseError {
    #[error("invalid socket frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("socket envelope is missing `{0}`")]
    MissingField(&'static str),
}

pub fn parse_frame(raw: &str) -> Result<SocketFrame, FrameParseError> {
    let body: Value = serde_json::from_str(raw)?;
    let frame_type = body.get("type").and_then(Value::as_str).unwrap_or_default();

    match frame_type {
        "hello" => Ok(SocketFrame::Hello),
        "disconnect" => Ok(SocketFrame::Disconnect {
            reason: body.get("reason").and_then(Value::as_str).map(str::to_owned),
        }),
        _ => {
            let envelope_id = body
                .get("envelope_id")
                .and_then(Value::as_str)
                .ok_or(FrameParseError::MissingField("envelope_id"))?
                .to_string();

            let event = if frame_type == "interactive" {
                parse_interactive_payload(body.get("payload").unwrap_or(&Value::Null))
                    .unwrap_or(SocketEvent::Unsupported { event_type: frame_type.to_string() })
            } else {
                SocketEvent::Unsupported { event_type: frame_type.to_string() }
            };

            Ok(SocketFrame::Envelope(SocketEnvelope { envelope_id, event }))
        }
    }
}

fn parse_interactive_payload(payload: &Value) -> Option<SocketEvent> {
    if payload.get("type").and_then(Value::as_str) != Some("block_actions") {
        return None;
    }

    let action = payload.get("actions").and_then(|actions| actions.get(0))?;

    Some(SocketEvent::BlockAction(BlockActionEvent {
        channel_id: payload.pointer("/channel/id").and_then(Value::as_str)?.to_string(),
        message_ts: payload.pointer("/message/ts").and_then(Value::as_str)?.to_string(),
        user_id: payload.pointer("/user/id").and_then(Value::as_str)?.to_string(),
        action_id: action.get("action_id").and_then(Value::as_str)?.to_string(),
        value: action.get("value").and_then(Value::as_str).map(str::to_owned),
        message_blocks: payload
            .pointer("/message/blocks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }))
}

/// Ticket id carried in an acknowledge button value (`acknowledge_<id>`).
pub fn acknowledge_ticket_id(value: &str) -> Option<i64> {
    value.strip_prefix("acknowledge_")?.parse().ok()
}

/// The edited block list after an acknowledgment: the first section block of
/// the original message followed by the acknowledged-by footer. Every other
/// block (detail fields, the button row) is dropped.
pub fn acknowledged_blocks(
    original: &[Value],
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<Vec<Value>, SlackError> {
    let first_section = original
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("section"))
        .cloned();

    let footer = serde_json::to_value(acknowledged_context_block(user_id, at))?;

    Ok(match first_section {
        Some(section) => vec![section, footer],
        None => vec![footer],
    })
}

#[async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn handle(&self, event: &BlockActionEvent) -> Result<(), SlackError>;
}

/// Message-edit seam so the acknowledge flow is testable without HTTP.
#[async_trait]
pub trait MessageEditor: Send + Sync {
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        fallback: &str,
        blocks: &[Value],
    ) -> Result<(), SlackError>;
}

#[async_trait]
impl MessageEditor for SlackApiClient {
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        fallback: &str,
        blocks: &[Value],
    ) -> Result<(), SlackError> {
        SlackApiClient::update_message(self, channel, ts, fallback, blocks).await
    }
}

/// Rewrites an alert in place once its Acknowledge button is pressed.
pub struct AcknowledgeHandler {
    editor: Arc<dyn MessageEditor>,
}

impl AcknowledgeHandler {
    pub fn new(editor: Arc<dyn MessageEditor>) -> Self {
        Self { editor }
    }
}

#[async_trait]
impl InteractionHandler for AcknowledgeHandler {
    async fn handle(&self, event: &BlockActionEvent) -> Result<(), SlackError> {
        if event.action_id != ACKNOWLEDGE_ACTION_ID {
            debug!(action_id = %event.action_id, "ignoring non-acknowledge action");
            return Ok(());
        }

        let ticket_id = event.value.as_deref().and_then(acknowledge_ticket_id);
        debug!(
            channel = %event.channel_id,
            ticket_id = ticket_id.unwrap_or_default(),
            user = %event.user_id,
            "acknowledging ticket alert"
        );

        let blocks = acknowledged_blocks(&event.message_blocks, &event.user_id, Utc::now())?;
        self.editor
            .update_message(&event.channel_id, &event.message_ts, "Ticket acknowledged", &blocks)
            .await
    }
}
