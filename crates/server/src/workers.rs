use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tagwatch_core::sse::ServiceState;
use tagwatch_engine::{Core, REQUIRED_SLACK_KEYS, SLACK_APP_TOKEN_KEY, SLACK_BOT_TOKEN_KEY};
use tagwatch_slack::socket::ReconnectPolicy;
use tagwatch_slack::{AcknowledgeHandler, SlackApiClient, SocketModeRunner, WebSocketTransport};

/// The chat interaction listener: waits on its own config gate, then runs
/// the Socket Mode loop until cancellation. A missing or rejected token
/// surfaces as an `error` status on the hub rather than a crash.
pub async fn chat_listener(core: Core, cancel: CancellationToken) {
    if !core.wait_for_keys(&cancel, "slack", REQUIRED_SLACK_KEYS).await {
        return;
    }

    let bot_token = match core.require_config(SLACK_BOT_TOKEN_KEY).await {
        Ok(token) => token,
        Err(error) => {
            warn!(error = %error, "slack bot token vanished after gate");
            core.hub.set_status("slack", ServiceState::Error, Some(&error.to_string()));
            return;
        }
    };
    let app_token = match core.require_config(SLACK_APP_TOKEN_KEY).await {
        Ok(token) => token,
        Err(error) => {
            warn!(error = %error, "slack app token vanished after gate");
            core.hub.set_status("slack", ServiceState::Error, Some(&error.to_string()));
            return;
        }
    };

    let api = match SlackApiClient::new(bot_token) {
        Ok(api) => Arc::new(api),
        Err(error) => {
            warn!(error = %error, "slack client construction failed");
            core.hub.set_status("slack", ServiceState::Error, Some(&error.to_string()));
            return;
        }
    };

    let handler = Arc::new(AcknowledgeHandler::new(api));
    let transport = Arc::new(WebSocketTransport::new(SecretString::from(app_token)));
    let runner =
        SocketModeRunner::new(transport, handler, core.hub.clone(), ReconnectPolicy::default());

    runner.run(cancel).await;
}
