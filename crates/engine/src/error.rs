use thiserror::Error;

use tagwatch_core::notify::Severity;
use tagwatch_db::repositories::RepositoryError;
use tagwatch_slack::SlackError;
use tagwatch_zendesk::ZendeskError;

/// Engine failure taxonomy. The polling engine catches all of these, emits
/// an SSE error event with a short human message, and proceeds to sleep -
/// only a failure to open the database at process start is fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required configuration key `{0}` is missing")]
    ConfigMissing(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream rejected credentials: {0}")]
    AuthRejected(String),
    #[error("parse failure: {0}")]
    Parse(String),
    #[error("alert was already dispatched for this deadline")]
    DuplicateAlert,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("broken subscription row: {0}")]
    Subscription(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Severity used when the failure surfaces as an admin notification.
    pub fn severity(&self) -> Severity {
        match self {
            Self::ConfigMissing(_) => Severity::Danger,
            _ => Severity::Warning,
        }
    }
}

impl From<ZendeskError> for EngineError {
    fn from(error: ZendeskError) -> Self {
        match error {
            ZendeskError::Transport(inner) => Self::Transport(inner.to_string()),
            ZendeskError::AuthRejected(status) => Self::AuthRejected(status.to_string()),
            ZendeskError::Status(status) => {
                Self::Transport(format!("zendesk returned status {status}"))
            }
            ZendeskError::Parse(inner) => Self::Parse(inner.to_string()),
            ZendeskError::UserNotFound(email) => {
                Self::NotFound(format!("zendesk user `{email}`"))
            }
        }
    }
}

impl From<SlackError> for EngineError {
    fn from(error: SlackError) -> Self {
        match error {
            SlackError::MissingToken => Self::ConfigMissing("slack token".to_string()),
            SlackError::Transport(inner) => Self::Transport(inner.to_string()),
            SlackError::Status(status) => {
                Self::Transport(format!("slack returned status {status}"))
            }
            SlackError::Api(reason) => Self::Transport(format!("slack api error: {reason}")),
            SlackError::Parse(inner) => Self::Parse(inner.to_string()),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Duplicate => Self::DuplicateAlert,
            RepositoryError::Decode(reason) => Self::Parse(reason),
            RepositoryError::Database(inner) => Self::Internal(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineError;
    use tagwatch_core::notify::Severity;
    use tagwatch_db::repositories::RepositoryError;

    #[test]
    fn duplicate_cache_rows_map_to_duplicate_alert() {
        let error = EngineError::from(RepositoryError::Duplicate);
        assert!(matches!(error, EngineError::DuplicateAlert));
    }

    #[test]
    fn missing_config_is_the_only_danger_severity() {
        assert_eq!(EngineError::ConfigMissing("zendesk_api_key".into()).severity(), Severity::Danger);
        assert_eq!(EngineError::Transport("timeout".into()).severity(), Severity::Warning);
        assert_eq!(EngineError::AuthRejected("401".into()).severity(), Severity::Warning);
    }
}
