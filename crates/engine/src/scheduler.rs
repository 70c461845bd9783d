use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Core, DAILY_SUMMARY_ENABLED_KEY};
use crate::error::EngineError;
use crate::summary::SummaryComposer;

pub const SCHEDULER_TICK: Duration = Duration::from_secs(60);

/// Fires each user's daily summary at their configured time of day, gated on
/// the `daily_summary_enabled` feature flag. A per-user sent-date guard keeps
/// a minute from firing twice.
pub struct SummaryScheduler {
    core: Core,
    composer: SummaryComposer,
}

impl SummaryScheduler {
    pub fn new(core: Core) -> Self {
        let composer = SummaryComposer::new(core.clone());
        Self { core, composer }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut sent: HashMap<i64, NaiveDate> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(SCHEDULER_TICK) => {}
            }

            if let Err(error) = self.tick(Utc::now(), &mut sent).await {
                warn!(error = %error, "summary scheduler tick failed");
            }
        }
    }

    /// One scheduler pass at `now`; public so tests can drive the clock.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        sent: &mut HashMap<i64, NaiveDate>,
    ) -> Result<(), EngineError> {
        let enabled = self
            .core
            .config
            .get(DAILY_SUMMARY_ENABLED_KEY)
            .await?
            .map(|value| value == "true")
            .unwrap_or(false);
        if !enabled {
            return Ok(());
        }

        let today = now.date_naive();

        for user in self.core.users.list_daily_summary_enabled().await? {
            let Some(summary_time) = user.summary_time else {
                continue;
            };

            let due = summary_time.hour() == now.hour() && summary_time.minute() == now.minute();
            if !due || sent.get(&user.id) == Some(&today) {
                continue;
            }

            debug!(user_id = user.id, day = today.day(), "daily summary due");
            match self.composer.compose_at(&user.email, now).await {
                Ok(outcome) => {
                    sent.insert(user.id, today);
                    info!(user_id = user.id, dm_sent = outcome.dm_sent, "daily summary composed");
                }
                Err(error) => {
                    warn!(user_id = user.id, error = %error, "daily summary failed");
                    self.core.notifications.push(
                        "Daily Summary Error",
                        &format!("Summary for {} failed: {error}", user.email),
                        tagwatch_core::notify::Severity::Warning,
                    );
                }
            }
        }

        Ok(())
    }
}
