use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use tagwatch_slack::blocks::{
    daily_summary_message, DailySummaryView, SummaryRatingView, SummaryTicketView,
};
use tagwatch_zendesk::{SatisfactionRating, SlaInfo, Ticket};

use crate::core::{Core, Helpdesk};
use crate::error::EngineError;

const SUMMARY_WINDOW_HOURS: i64 = 24;
const DESCRIPTION_WORD_LIMIT: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryOutcome {
    pub text: String,
    pub dm_sent: bool,
}

/// Aggregates a user's last 24 hours (unread tickets, active SLAs, CSAT)
/// into a text summary and a Block Kit DM. The text always comes back to the
/// caller; DM delivery is best-effort.
pub struct SummaryComposer {
    core: Core,
}

impl SummaryComposer {
    pub fn new(core: Core) -> Self {
        Self { core }
    }

    pub async fn compose(&self, user_email: &str) -> Result<SummaryOutcome, EngineError> {
        self.compose_at(user_email, Utc::now()).await
    }

    pub async fn compose_at(
        &self,
        user_email: &str,
        now: DateTime<Utc>,
    ) -> Result<SummaryOutcome, EngineError> {
        let since = now - Duration::hours(SUMMARY_WINDOW_HOURS);

        let credentials = self.core.helpdesk_credentials().await?;
        let helpdesk = self.core.helpdesk.open(&credentials)?;

        let agent = helpdesk.find_user_by_email(user_email).await?;
        let tickets = helpdesk.search_assigned_to(agent.id, since).await?;
        let (_, sla_data) = helpdesk.search_active_sla().await?;
        let ratings = helpdesk.csat_since(agent.id, since).await?;

        let agent_email = agent.email.as_deref().unwrap_or(user_email);
        let unread = filter_unread(&tickets, agent_email);
        let with_sla = filter_active_sla(&tickets, &sla_data);

        let text = compile_summary_text(&agent.name, now, &unread, &with_sla, &ratings);

        let dm_sent =
            self.deliver_dm(helpdesk.as_ref(), user_email, &agent.name, now, &unread, &with_sla, &ratings)
                .await;

        Ok(SummaryOutcome { text, dm_sent })
    }

    /// DM the summary when the local user has (or can lazily resolve) a
    /// Slack id. Any failure leaves the text summary untouched.
    #[allow(clippy::too_many_arguments)]
    async fn deliver_dm(
        &self,
        helpdesk: &dyn Helpdesk,
        user_email: &str,
        agent_name: &str,
        now: DateTime<Utc>,
        unread: &[&Ticket],
        with_sla: &[&Ticket],
        ratings: &[SatisfactionRating],
    ) -> bool {
        let local_user = match self.core.users.find_by_email(user_email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(email = user_email, "no local user; summary dm skipped");
                return false;
            }
            Err(error) => {
                warn!(error = %error, "user lookup failed; summary dm skipped");
                return false;
            }
        };

        let slack_user_id = match local_user.slack_user_id {
            Some(id) => id,
            // Resolve lazily from the email and cache the result.
            None => match self.core.chat.resolve_user_by_email(user_email).await {
                Ok(id) => {
                    if let Err(error) =
                        self.core.users.set_slack_user_id(local_user.id, &id).await
                    {
                        warn!(error = %error, "failed to cache resolved slack user id");
                    }
                    id
                }
                Err(error) => {
                    debug!(error = %error, "slack user resolution failed; summary dm skipped");
                    return false;
                }
            },
        };

        let view = DailySummaryView {
            user_name: agent_name.to_string(),
            date: now.format("%B %-d, %Y").to_string(),
            unread: unread.iter().map(|ticket| summary_ticket(helpdesk, ticket)).collect(),
            active_sla: with_sla.iter().map(|ticket| summary_ticket(helpdesk, ticket)).collect(),
            csat: ratings
                .iter()
                .map(|rating| SummaryRatingView {
                    score: rating.score.clone(),
                    comment: rating.comment.clone().unwrap_or_default(),
                })
                .collect(),
        };

        match self.core.chat.send_dm(&slack_user_id, &daily_summary_message(&view)).await {
            Ok(()) => {
                info!(email = user_email, "daily summary dm sent");
                true
            }
            Err(error) => {
                warn!(error = %error, "failed to send summary dm");
                false
            }
        }
    }
}

fn summary_ticket(helpdesk: &dyn Helpdesk, ticket: &Ticket) -> SummaryTicketView {
    SummaryTicketView {
        ticket_id: ticket.id,
        url: helpdesk.agent_ticket_url(ticket.id),
        subject: ticket.subject.clone(),
        description: truncate_words(&ticket.description, DESCRIPTION_WORD_LIMIT),
    }
}

/// Tickets whose last touch was not the user themselves.
fn filter_unread<'t>(tickets: &'t [Ticket], user_email: &str) -> Vec<&'t Ticket> {
    tickets
        .iter()
        .filter(|ticket| ticket.via_address().map_or(true, |address| address != user_email))
        .collect()
}

/// Tickets that appear in the SLA map with at least one active metric.
fn filter_active_sla<'t>(
    tickets: &'t [Ticket],
    sla_data: &HashMap<i64, SlaInfo>,
) -> Vec<&'t Ticket> {
    tickets
        .iter()
        .filter(|ticket| {
            sla_data.get(&ticket.id).and_then(SlaInfo::first_active).is_some()
        })
        .collect()
}

fn compile_summary_text(
    user_name: &str,
    now: DateTime<Utc>,
    unread: &[&Ticket],
    with_sla: &[&Ticket],
    ratings: &[SatisfactionRating],
) -> String {
    let mut out = format!(
        "Hello {user_name}! Here's your Daily Summary for {}:\n\n",
        now.format("%B %-d, %Y")
    );

    if unread.is_empty() {
        out.push_str("No unread tickets from the last 24 hours.\n");
    } else {
        out.push_str(&format!(
            "You have {} unread tickets that were updated since yesterday:\n",
            unread.len()
        ));
        for ticket in unread {
            out.push_str(&format!(
                "- <{}|{}> (ID: {})\n  {}\n",
                ticket.url,
                ticket.subject,
                ticket.id,
                truncate_words(&ticket.description, DESCRIPTION_WORD_LIMIT)
            ));
        }
    }

    if with_sla.is_empty() {
        out.push_str("\nNo open tickets with active SLAs.\n");
    } else {
        out.push_str(&format!(
            "\nYou have {} open tickets with active SLAs:\n",
            with_sla.len()
        ));
        for ticket in with_sla {
            out.push_str(&format!(
                "- <{}|{}> (ID: {})\n  {}\n",
                ticket.url,
                ticket.subject,
                ticket.id,
                truncate_words(&ticket.description, DESCRIPTION_WORD_LIMIT)
            ));
        }
    }

    if ratings.is_empty() {
        out.push_str("\nNo new CSAT reviews from the last 24 hours.\n");
    } else {
        out.push_str(&format!("\nYou received {} new CSAT reviews:\n", ratings.len()));
        for rating in ratings {
            out.push_str(&format!("- {}\n", rating.comment.as_deref().unwrap_or("(no comment)")));
        }
    }

    out
}

fn truncate_words(text: &str, word_limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > word_limit {
        format!("{}...", words[..word_limit].join(" "))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};

    use super::{compile_summary_text, filter_active_sla, filter_unread, truncate_words};
    use tagwatch_zendesk::{
        SatisfactionRating, SlaInfo, SlaPolicyMetric, SlaStage, Ticket, Via, ViaAddress, ViaSource,
    };

    fn ticket(id: i64, from_address: Option<&str>) -> Ticket {
        let at = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        Ticket {
            id,
            url: format!("https://acme.zendesk.com/api/v2/tickets/{id}.json"),
            subject: format!("Ticket {id}"),
            description: "A fairly short description".to_string(),
            tags: Vec::new(),
            requester_id: None,
            organization_id: None,
            assignee_id: None,
            created_at: at,
            updated_at: at,
            via: Via {
                channel: "email".to_string(),
                source: ViaSource {
                    from: ViaAddress { address: from_address.map(str::to_owned) },
                },
            },
        }
    }

    #[test]
    fn unread_filter_drops_tickets_last_touched_by_the_user() {
        let tickets = vec![
            ticket(1, Some("someone@customer.test")),
            ticket(2, Some("agent@acme.test")),
            ticket(3, None),
        ];

        let unread = filter_unread(&tickets, "agent@acme.test");
        assert_eq!(unread.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn active_sla_filter_requires_an_active_metric() {
        let tickets = vec![ticket(1, None), ticket(2, None), ticket(3, None)];

        let mut sla_data = HashMap::new();
        sla_data.insert(
            1,
            SlaInfo {
                policy_metrics: vec![SlaPolicyMetric {
                    metric: "next_reply_time".to_string(),
                    stage: SlaStage::Active,
                    breach_at: None,
                    hours: 0,
                    minutes: 0,
                    days: 0,
                }],
            },
        );
        sla_data.insert(
            2,
            SlaInfo {
                policy_metrics: vec![SlaPolicyMetric {
                    metric: "resolution_time".to_string(),
                    stage: SlaStage::Fulfilled,
                    breach_at: None,
                    hours: 0,
                    minutes: 0,
                    days: 0,
                }],
            },
        );

        let filtered = filter_active_sla(&tickets, &sla_data);
        assert_eq!(filtered.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn long_descriptions_are_truncated_to_thirty_words() {
        let words: Vec<String> = (0..40).map(|index| format!("word{index}")).collect();
        let truncated = truncate_words(&words.join(" "), 30);

        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.split_whitespace().count(), 30);

        assert_eq!(truncate_words("short text", 30), "short text");
    }

    #[test]
    fn summary_text_covers_all_sections() {
        let now = Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap();
        let unread_ticket = ticket(7, Some("customer@example.test"));
        let sla_ticket = ticket(8, None);
        let ratings = vec![SatisfactionRating {
            id: 1,
            ticket_id: Some(7),
            score: "good".to_string(),
            comment: Some("Quick fix, thanks!".to_string()),
            created_at: None,
        }];

        let text = compile_summary_text(
            "Pat",
            now,
            &[&unread_ticket],
            &[&sla_ticket],
            &ratings,
        );

        assert!(text.starts_with("Hello Pat! Here's your Daily Summary for August 2, 2026:"));
        assert!(text.contains("You have 1 unread tickets that were updated since yesterday:"));
        assert!(text.contains("You have 1 open tickets with active SLAs:"));
        assert!(text.contains("Quick fix, thanks!"));
    }

    #[test]
    fn empty_summary_reads_as_quiet_day() {
        let now = Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap();
        let text = compile_summary_text("Pat", now, &[], &[], &[]);

        assert!(text.contains("No unread tickets from the last 24 hours."));
        assert!(text.contains("No open tickets with active SLAs."));
        assert!(text.contains("No new CSAT reviews from the last 24 hours."));
    }
}
