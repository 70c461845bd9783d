use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tagwatch_core::sse::{ServiceState, SseHub};

use crate::api::connections_open;
use crate::events::{parse_frame, InteractionHandler, SocketFrame};

const SERVICE: &str = "slack";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_frame(&self) -> Result<Option<SocketFrame>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Real Socket Mode transport: `apps.connections.open` for the WebSocket
/// URL, then a tungstenite stream.
pub struct WebSocketTransport {
    app_token: SecretString,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketTransport {
    pub fn new(app_token: SecretString) -> Self {
        Self { app_token, stream: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = connections_open(&self.app_token)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_frame(&self) -> Result<Option<SocketFrame>, TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Receive("transport is not connected".to_string()));
        };

        loop {
            let Some(message) = stream.next().await else {
                return Ok(None);
            };
            let message = message.map_err(|error| TransportError::Receive(error.to_string()))?;

            match message {
                Message::Text(raw) => match parse_frame(raw.as_str()) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(error) => {
                        warn!(error = %error, "skipping unparseable socket frame");
                        continue;
                    }
                },
                Message::Ping(payload) => {
                    stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|error| TransportError::Receive(error.to_string()))?;
                }
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("transport is not connected".to_string()));
        };

        let ack = serde_json::json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(Message::text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            let _ = stream.close(None).await;
        }
        Ok(())
    }
}

enum PumpExit {
    Cancelled,
    Closed,
    Reconnect,
}

/// Socket Mode event loop. Reports `polling` / `connected` / `error` status
/// transitions over the SSE hub, acknowledges every envelope back to the
/// transport, and never lets a handler failure kill the loop.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    handler: Arc<dyn InteractionHandler>,
    hub: Arc<SseHub>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        handler: Arc<dyn InteractionHandler>,
        hub: Arc<SseHub>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, hub, reconnect_policy }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return;
            }

            self.hub.set_status(SERVICE, ServiceState::Polling, None);

            match self.connect_and_pump(&cancel).await {
                Ok(PumpExit::Cancelled) => {
                    let _ = self.transport.disconnect().await;
                    return;
                }
                Ok(PumpExit::Closed) => {
                    self.hub.set_status(SERVICE, ServiceState::Error, Some("socket stream closed"));
                    info!("socket mode stream closed");
                    return;
                }
                Ok(PumpExit::Reconnect) => {
                    attempt = 0;
                    info!("socket mode reconnect requested by remote");
                    continue;
                }
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );
                    self.hub.set_status(
                        SERVICE,
                        ServiceState::Error,
                        Some(&transport_error.to_string()),
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; interaction listener stopped"
                        );
                        return;
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    attempt += 1;
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_pump(&self, cancel: &CancellationToken) -> Result<PumpExit, TransportError> {
        self.transport.connect().await?;
        self.hub.set_status(SERVICE, ServiceState::Connected, None);
        info!("socket mode transport connected");

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(PumpExit::Cancelled),
                frame = self.transport.next_frame() => frame?,
            };

            let Some(frame) = frame else {
                let _ = self.transport.disconnect().await;
                return Ok(PumpExit::Closed);
            };

            match frame {
                SocketFrame::Hello => {
                    debug!("socket mode hello received");
                }
                SocketFrame::Disconnect { reason } => {
                    debug!(reason = reason.as_deref().unwrap_or("unspecified"), "disconnect frame");
                    let _ = self.transport.disconnect().await;
                    return Ok(PumpExit::Reconnect);
                }
                SocketFrame::Envelope(envelope) => {
                    if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                        warn!(
                            envelope_id = %envelope.envelope_id,
                            error = %error,
                            "failed to acknowledge slack envelope"
                        );
                    }

                    if let crate::events::SocketEvent::BlockAction(event) = &envelope.event {
                        if let Err(error) = self.handler.handle(event).await {
                            warn!(
                                envelope_id = %envelope.envelope_id,
                                error = %error,
                                "interaction handling failed; continuing socket loop"
                            );
                        }
                    }
                }
            }
        }
    }
}
