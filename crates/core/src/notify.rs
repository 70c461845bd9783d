use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::sse::SseHub;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub category: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    /// Stream framing: `Category: Message (severity)`.
    fn to_stream_line(&self) -> String {
        format!("{}: {} ({})", self.category, self.message, self.severity.as_str())
    }
}

/// Process-lifetime notification store for the admin console's banners.
/// Every push also goes out over the SSE hub.
pub struct NotificationBus {
    hub: Arc<SseHub>,
    entries: Mutex<Vec<Notification>>,
}

impl NotificationBus {
    pub fn new(hub: Arc<SseHub>) -> Self {
        Self { hub, entries: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, category: &str, message: &str, severity: Severity) {
        let notification = Notification {
            category: category.to_owned(),
            message: message.to_owned(),
            severity,
        };
        let line = notification.to_stream_line();

        self.entries.lock().expect("notification lock poisoned").push(notification);
        self.hub.broadcast(&line);
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.lock().expect("notification lock poisoned").clone()
    }
}
