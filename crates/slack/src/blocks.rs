use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    #[serde(rename = "mrkdwn")]
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    #[serde(rename = "type")]
    element_type: &'static str,
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            element_type: "button",
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<TextObject>>,
    },
    Actions {
        elements: Vec<ButtonElement>,
    },
    Context {
        elements: Vec<TextObject>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section(mut self, text: TextObject) -> Self {
        self.blocks.push(Block::Section { text: Some(text), fields: None });
        self
    }

    pub fn field_section(mut self, fields: Vec<TextObject>) -> Self {
        self.blocks.push(Block::Section { text: None, fields: Some(fields) });
        self
    }

    pub fn actions(mut self, elements: Vec<ButtonElement>) -> Self {
        self.blocks.push(Block::Actions { elements });
        self
    }

    pub fn context(mut self, elements: Vec<TextObject>) -> Self {
        self.blocks.push(Block::Context { elements });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

pub const ACKNOWLEDGE_ACTION_ID: &str = "acknowledge";

pub fn acknowledge_value(ticket_id: i64) -> String {
    format!("acknowledge_{ticket_id}")
}

/// View model for a ticket alert card.
#[derive(Clone, Debug, PartialEq)]
pub struct TicketAlertView {
    pub header: String,
    pub description: String,
    pub ticket_id: i64,
    pub ticket_url: String,
    pub subject: String,
    pub requester: String,
    pub organization: String,
    pub tag: String,
    pub sla_expiration: Option<DateTime<Utc>>,
}

/// The three-block alert card: header section, six-field detail section, and
/// a primary Acknowledge button whose value carries the ticket id.
pub fn ticket_alert_message(view: &TicketAlertView) -> MessageTemplate {
    let expiration = view
        .sla_expiration
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string());

    MessageBuilder::new(format!("{}: {}", view.header, view.subject))
        .section(TextObject::mrkdwn(format!("*{}*\n{}", view.header, view.description)))
        .field_section(vec![
            TextObject::mrkdwn(format!("*Ticket:*\n<{}|#{}>", view.ticket_url, view.ticket_id)),
            TextObject::mrkdwn(format!("*Subject:*\n{}", view.subject)),
            TextObject::mrkdwn(format!("*Requester:*\n{}", view.requester)),
            TextObject::mrkdwn(format!("*Organization:*\n{}", view.organization)),
            TextObject::mrkdwn(format!("*Tag:*\n{}", view.tag)),
            TextObject::mrkdwn(format!("*SLA Expiration:*\n{expiration}")),
        ])
        .actions(vec![ButtonElement::new(ACKNOWLEDGE_ACTION_ID, "Acknowledge")
            .style(ButtonStyle::Primary)
            .value(acknowledge_value(view.ticket_id))])
        .build()
}

/// Footer appended to an alert once someone acknowledged it.
pub fn acknowledged_context_block(user_id: &str, at: DateTime<Utc>) -> Block {
    let stamp = at.format("%a, %d %b %Y %H:%M:%S GMT");
    Block::Context {
        elements: vec![TextObject::mrkdwn(format!(
            "Ticket acknowledged by <@{user_id}> at {stamp}"
        ))],
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SummaryTicketView {
    pub ticket_id: i64,
    pub url: String,
    pub subject: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SummaryRatingView {
    pub score: String,
    pub comment: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DailySummaryView {
    pub user_name: String,
    pub date: String,
    pub unread: Vec<SummaryTicketView>,
    pub active_sla: Vec<SummaryTicketView>,
    pub csat: Vec<SummaryRatingView>,
}

/// Block Kit rendition of the daily summary DM; the parallel plain-text
/// summary is composed by the caller.
pub fn daily_summary_message(view: &DailySummaryView) -> MessageTemplate {
    let mut builder = MessageBuilder::new(format!("Daily Summary for {}", view.user_name))
        .section(TextObject::mrkdwn(format!(
            ":wave: Hello {}! Here's your Daily Summary for {}.",
            view.user_name, view.date
        )));

    if view.unread.is_empty() {
        builder = builder
            .section(TextObject::mrkdwn("No unread tickets from the last 24 hours.".to_string()));
    } else {
        builder = builder.section(TextObject::mrkdwn(format!(
            "*You have {} unread ticket{} updated since yesterday:*\n{}",
            view.unread.len(),
            plural(view.unread.len()),
            ticket_lines(&view.unread)
        )));
    }

    if view.active_sla.is_empty() {
        builder = builder
            .section(TextObject::mrkdwn("No open tickets with active SLAs.".to_string()));
    } else {
        builder = builder.section(TextObject::mrkdwn(format!(
            "*You have {} open ticket{} with active SLAs:*\n{}",
            view.active_sla.len(),
            plural(view.active_sla.len()),
            ticket_lines(&view.active_sla)
        )));
    }

    if view.csat.is_empty() {
        builder = builder
            .section(TextObject::mrkdwn("No new CSAT reviews from the last 24 hours.".to_string()));
    } else {
        let lines = view
            .csat
            .iter()
            .map(|rating| format!("• {} — {}", rating.score, rating.comment))
            .collect::<Vec<_>>()
            .join("\n");
        builder = builder.section(TextObject::mrkdwn(format!(
            "*You received {} new CSAT review{}:*\n{lines}",
            view.csat.len(),
            plural(view.csat.len())
        )));
    }

    builder
        .context(vec![TextObject::plain("Sent by tagwatch daily summary")])
        .build()
}

fn ticket_lines(tickets: &[SummaryTicketView]) -> String {
    tickets
        .iter()
        .map(|ticket| {
            format!(
                "• <{}|{}> (ID: {})\n  {}",
                ticket.url, ticket.subject, ticket.ticket_id, ticket.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        acknowledged_context_block, daily_summary_message, ticket_alert_message, Block,
        ButtonStyle, DailySummaryView, SummaryRatingView, SummaryTicketView, TextObject,
        TicketAlertView,
    };

    fn alert_view() -> TicketAlertView {
        TicketAlertView {
            header: "SLA Deadline Alert".to_string(),
            description: "Less than 1 hour remaining".to_string(),
            ticket_id: 42,
            ticket_url: "https://acme.zendesk.com/agent/tickets/42".to_string(),
            subject: "Printer on fire".to_string(),
            requester: "Pat Doe".to_string(),
            organization: "Acme".to_string(),
            tag: "urgent".to_string(),
            sla_expiration: Some(Utc.with_ymd_and_hms(2026, 8, 2, 17, 40, 0).unwrap()),
        }
    }

    #[test]
    fn alert_card_has_header_fields_and_acknowledge_button() {
        let message = ticket_alert_message(&alert_view());
        assert_eq!(message.blocks.len(), 3);

        let Block::Section { text: Some(TextObject::Mrkdwn { text }), fields: None } =
            &message.blocks[0]
        else {
            panic!("first block must be a markdown section");
        };
        assert_eq!(text, "*SLA Deadline Alert*\nLess than 1 hour remaining");

        let Block::Section { text: None, fields: Some(fields) } = &message.blocks[1] else {
            panic!("second block must be a field section");
        };
        assert_eq!(fields.len(), 6);
        assert!(matches!(
            &fields[0],
            TextObject::Mrkdwn { text } if text.contains("<https://acme.zendesk.com/agent/tickets/42|#42>")
        ));
        assert!(matches!(
            &fields[5],
            TextObject::Mrkdwn { text } if text.contains("2026-08-02 17:40")
        ));

        let Block::Actions { elements } = &message.blocks[2] else {
            panic!("third block must be actions");
        };
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].action_id, "acknowledge");
        assert_eq!(elements[0].style, Some(ButtonStyle::Primary));
        assert_eq!(elements[0].value.as_deref(), Some("acknowledge_42"));
    }

    #[test]
    fn alert_without_sla_shows_na_expiration() {
        let view = TicketAlertView { sla_expiration: None, ..alert_view() };
        let message = ticket_alert_message(&view);

        let Block::Section { fields: Some(fields), .. } = &message.blocks[1] else {
            panic!("second block must be a field section");
        };
        assert!(matches!(
            &fields[5],
            TextObject::Mrkdwn { text } if text.ends_with("N/A")
        ));
    }

    #[test]
    fn serialized_button_carries_slack_wire_type() {
        let message = ticket_alert_message(&alert_view());
        let json = serde_json::to_value(&message.blocks).expect("serialize blocks");

        assert_eq!(json[0]["type"], "section");
        assert_eq!(json[0]["text"]["type"], "mrkdwn");
        assert_eq!(json[2]["type"], "actions");
        assert_eq!(json[2]["elements"][0]["type"], "button");
        assert_eq!(json[2]["elements"][0]["text"]["type"], "plain_text");
    }

    #[test]
    fn acknowledged_footer_uses_rfc1123_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 8, 2, 17, 0, 0).unwrap();
        let block = acknowledged_context_block("U123", at);

        let Block::Context { elements } = block else {
            panic!("footer must be a context block");
        };
        assert!(matches!(
            &elements[0],
            TextObject::Mrkdwn { text }
                if text == "Ticket acknowledged by <@U123> at Sun, 02 Aug 2026 17:00:00 GMT"
        ));
    }

    #[test]
    fn daily_summary_covers_all_three_sections() {
        let view = DailySummaryView {
            user_name: "Pat".to_string(),
            date: "August 2, 2026".to_string(),
            unread: vec![SummaryTicketView {
                ticket_id: 7,
                url: "https://acme.zendesk.com/agent/tickets/7".to_string(),
                subject: "Login broken".to_string(),
                description: "Cannot log in since the upgrade".to_string(),
            }],
            active_sla: vec![],
            csat: vec![SummaryRatingView {
                score: "good".to_string(),
                comment: "Fast and friendly".to_string(),
            }],
        };

        let message = daily_summary_message(&view);
        let rendered = serde_json::to_string(&message.blocks).expect("serialize");

        assert!(rendered.contains("Hello Pat!"));
        assert!(rendered.contains("1 unread ticket updated"));
        assert!(rendered.contains("No open tickets with active SLAs."));
        assert!(rendered.contains("Fast and friendly"));
        assert!(rendered.contains("August 2, 2026"));
    }

    #[test]
    fn summary_with_no_activity_still_renders_placeholders() {
        let view = DailySummaryView {
            user_name: "Pat".to_string(),
            date: "August 2, 2026".to_string(),
            unread: vec![],
            active_sla: vec![],
            csat: vec![],
        };

        let message = daily_summary_message(&view);
        let rendered = serde_json::to_string(&message.blocks).expect("serialize");
        assert!(rendered.contains("No unread tickets from the last 24 hours."));
        assert!(rendered.contains("No new CSAT reviews from the last 24 hours."));
    }
}
