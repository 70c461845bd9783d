use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Connection lifecycle reported per named service over the event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Polling,
    Connected,
    Error,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

/// The latest known status of a service, replayed to new subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub status: ServiceState,
    pub error: String,
}

#[derive(Serialize)]
struct StatusFrame<'a> {
    event: &'a str,
    data: &'a ServiceStatus,
}

const STATUS_EVENT: &str = "connection-status";

/// Single in-process broadcaster behind the `/events` stream.
///
/// The subscriber set and the per-service status map share one mutex; the
/// lock is held across a full fan-out, so messages from any one producer
/// reach every subscriber in producer order. A send to a gone subscriber is
/// ignored - disconnect cleanup happens when the subscription drops, never
/// implicitly during broadcast.
pub struct SseHub {
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<u64, UnboundedSender<String>>,
    statuses: BTreeMap<String, ServiceStatus>,
}

impl Default for SseHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SseHub {
    pub fn new() -> Self {
        Self { state: Mutex::new(HubState::default()) }
    }

    /// Register a subscriber. The returned subscription is seeded with one
    /// `connection-status` replay frame per known service before any live
    /// message, and unregisters itself on drop.
    pub fn subscribe(self: &Arc<Self>) -> SseSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("sse hub lock poisoned");

        for status in state.statuses.values() {
            if let Ok(frame) = serde_json::to_string(&StatusFrame { event: STATUS_EVENT, data: status })
            {
                let _ = tx.send(frame);
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);
        drop(state);

        SseSubscription { id, receiver: rx, hub: Arc::clone(self) }
    }

    fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock().expect("sse hub lock poisoned");
        state.subscribers.remove(&id);
    }

    /// Deliver a message to every current subscriber.
    pub fn broadcast(&self, message: &str) {
        let state = self.state.lock().expect("sse hub lock poisoned");
        for sender in state.subscribers.values() {
            let _ = sender.send(message.to_owned());
        }
    }

    /// Record the latest status for `service` and broadcast it.
    pub fn set_status(&self, service: &str, status: ServiceState, error: Option<&str>) {
        let entry = ServiceStatus {
            service: service.to_owned(),
            status,
            error: error.unwrap_or_default().to_owned(),
        };
        let frame = match serde_json::to_string(&StatusFrame { event: STATUS_EVENT, data: &entry }) {
            Ok(frame) => frame,
            Err(_) => return,
        };

        let mut state = self.state.lock().expect("sse hub lock poisoned");
        state.statuses.insert(service.to_owned(), entry);
        for sender in state.subscribers.values() {
            let _ = sender.send(frame.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().expect("sse hub lock poisoned").subscribers.len()
    }

    pub fn status_of(&self, service: &str) -> Option<ServiceStatus> {
        self.state.lock().expect("sse hub lock poisoned").statuses.get(service).cloned()
    }
}

/// A live registration on the hub. Dropping it removes the registration.
pub struct SseSubscription {
    id: u64,
    receiver: UnboundedReceiver<String>,
    hub: Arc<SseHub>,
}

impl SseSubscription {
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for SseSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ServiceState, SseHub, STATUS_EVENT};

    #[tokio::test]
    async fn new_subscriber_receives_status_replay_before_live_messages() {
        let hub = Arc::new(SseHub::new());
        hub.set_status("zendesk", ServiceState::Connected, None);

        let mut subscription = hub.subscribe();
        hub.broadcast("Tickets: refresh started (info)");

        let first = subscription.recv().await.expect("replay frame");
        assert!(first.contains(STATUS_EVENT));
        assert!(first.contains("\"service\":\"zendesk\""));
        assert!(first.contains("\"status\":\"connected\""));

        let second = subscription.recv().await.expect("live frame");
        assert_eq!(second, "Tickets: refresh started (info)");
    }

    #[tokio::test]
    async fn replay_carries_exactly_one_frame_per_service() {
        let hub = Arc::new(SseHub::new());
        hub.set_status("slack", ServiceState::Polling, None);
        hub.set_status("slack", ServiceState::Connected, None);
        hub.set_status("zendesk", ServiceState::Error, Some("timeout"));

        let mut subscription = hub.subscribe();
        let first = subscription.try_recv().expect("first replay");
        let second = subscription.try_recv().expect("second replay");
        assert!(subscription.try_recv().is_none(), "only one frame per service");

        // BTreeMap ordering: slack before zendesk.
        assert!(first.contains("\"service\":\"slack\""));
        assert!(first.contains("\"status\":\"connected\""), "latest status wins: {first}");
        assert!(second.contains("\"service\":\"zendesk\""));
        assert!(second.contains("\"error\":\"timeout\""));
    }

    #[tokio::test]
    async fn broadcast_never_drops_subscribers() {
        let hub = Arc::new(SseHub::new());
        let mut live = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);

        // One registration was dropped; the other must still be intact and
        // broadcasting must not change the set size.
        assert_eq!(hub.subscriber_count(), 1);
        hub.broadcast("ping");
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(live.recv().await.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn dropping_a_subscription_unregisters_it() {
        let hub = Arc::new(SseHub::new());
        let first = hub.subscribe();
        let second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(), 1);
        drop(second);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
