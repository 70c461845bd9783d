use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::blocks::MessageTemplate;

const SLACK_API_BASE: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("slack token is not configured")]
    MissingToken,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("slack returned status {0}")]
    Status(StatusCode),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("failed to parse slack response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Bot-token REST client. Construction fails fast when the token is missing
/// so callers never hold a client that cannot authenticate.
pub struct SlackApiClient {
    bot_token: SecretString,
    client: reqwest::Client,
    base_url: String,
}

impl SlackApiClient {
    pub fn new(bot_token: impl Into<String>) -> Result<Self, SlackError> {
        let bot_token: String = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(SlackError::MissingToken);
        }

        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { bot_token: bot_token.into(), client, base_url: SLACK_API_BASE.to_string() })
    }

    async fn post(&self, method: &str, payload: &Value) -> Result<Value, SlackError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlackError::Status(status));
        }

        check_envelope(serde_json::from_str(&response.text().await?)?)
    }

    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, SlackError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlackError::Status(status));
        }

        check_envelope(serde_json::from_str(&response.text().await?)?)
    }

    /// `chat.postMessage`; returns the message timestamp used for edits.
    pub async fn post_message(
        &self,
        channel: &str,
        template: &MessageTemplate,
    ) -> Result<String, SlackError> {
        let payload = json!({
            "channel": channel,
            "text": template.fallback_text,
            "blocks": template.blocks,
        });
        let body = self.post("chat.postMessage", &payload).await?;

        Ok(body.get("ts").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    /// `chat.update` with pre-rendered blocks (used by the acknowledge flow,
    /// which carries the original message's raw blocks).
    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        fallback: &str,
        blocks: &[Value],
    ) -> Result<(), SlackError> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "text": fallback,
            "blocks": blocks,
        });
        self.post("chat.update", &payload).await?;
        Ok(())
    }

    /// `users.lookupByEmail`; resolves the member id used for DMs.
    pub async fn lookup_user_by_email(&self, email: &str) -> Result<String, SlackError> {
        let body = self.get("users.lookupByEmail", &[("email", email)]).await?;

        body.pointer("/user/id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SlackError::Api("users.lookupByEmail returned no user id".to_string()))
    }

    /// `conversations.list`: public and private channels, archived excluded,
    /// cursor pagination until the server stops returning one.
    pub async fn list_channels(&self) -> Result<Vec<Channel>, SlackError> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;
        let limit = CHANNEL_PAGE_LIMIT.to_string();

        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("types", "public_channel,private_channel"),
                ("exclude_archived", "true"),
                ("limit", limit.as_str()),
            ];
            if let Some(cursor_value) = cursor.as_deref() {
                query.push(("cursor", cursor_value));
            }

            let body = self.get("conversations.list", &query).await?;
            let page = parse_channel_page(&body)?;
            debug!(count = page.channels.len(), "fetched slack channel page");
            channels.extend(page.channels);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(channels)
    }

    /// `conversations.open`; returns the DM channel id for a user.
    pub async fn open_dm(&self, user_id: &str) -> Result<String, SlackError> {
        let body = self.post("conversations.open", &json!({ "users": user_id })).await?;

        body.pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SlackError::Api("conversations.open returned no channel id".to_string()))
    }

    pub async fn send_dm(
        &self,
        user_id: &str,
        template: &MessageTemplate,
    ) -> Result<(), SlackError> {
        let channel = self.open_dm(user_id).await?;
        self.post_message(&channel, template).await?;
        Ok(())
    }
}

/// `apps.connections.open` - app-token authorized; returns the Socket Mode
/// WebSocket URL.
pub async fn connections_open(app_token: &SecretString) -> Result<String, SlackError> {
    if app_token.expose_secret().trim().is_empty() {
        return Err(SlackError::MissingToken);
    }

    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let response = client
        .post(format!("{SLACK_API_BASE}/apps.connections.open"))
        .bearer_auth(app_token.expose_secret())
        .header("Content-Type", "application/x-www-form-urlencoded")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SlackError::Status(status));
    }

    let body = check_envelope(serde_json::from_str(&response.text().await?)?)?;
    body.get("url")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| SlackError::Api("apps.connections.open returned no url".to_string()))
}

/// Slack wraps every response in `{ok, error?}`; an HTTP 200 with `ok: false`
/// is still a failure.
fn check_envelope(body: Value) -> Result<Value, SlackError> {
    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        return Ok(body);
    }

    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    Err(SlackError::Api(error))
}

struct ChannelPage {
    channels: Vec<Channel>,
    next_cursor: Option<String>,
}

fn parse_channel_page(body: &Value) -> Result<ChannelPage, SlackError> {
    let channels = body
        .get("channels")
        .cloned()
        .map(serde_json::from_value::<Vec<Channel>>)
        .transpose()?
        .unwrap_or_default();

    let next_cursor = body
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_owned);

    Ok(ChannelPage { channels, next_cursor })
}
