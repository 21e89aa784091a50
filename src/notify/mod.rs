pub mod hours;
pub mod ledger;
pub mod poller;

use crate::api::slack::SlackClient;
use crate::errors::Result;
use crate::models::slack::{
    escape_text, Attachment, AttachmentAction, AttachmentField, ChatMessage,
};
use crate::models::ticket::JiraTicket;
use chrono::{DateTime, Utc};
use ledger::{assignment_key, NotificationLedger};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Duplicate,
    /// No assignee, or Jira hides the assignee's email.
    Skipped,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Sent => "sent",
            NotifyOutcome::Duplicate => "duplicate",
            NotifyOutcome::Skipped => "skipped",
        }
    }
}

/// Sends assignment DMs, shared by the poller and the Jira webhook.
pub struct Notifier {
    slack: SlackClient,
    jira_url: String,
    bot_name: String,
    icon_emoji: String,
    ledger: Mutex<NotificationLedger>,
}

impl Notifier {
    pub fn new(
        slack: SlackClient,
        jira_url: String,
        bot_name: String,
        icon_emoji: String,
        ledger: NotificationLedger,
    ) -> Self {
        Self {
            slack,
            jira_url: jira_url.trim_end_matches('/').to_string(),
            bot_name,
            icon_emoji,
            ledger: Mutex::new(ledger),
        }
    }

    pub async fn tracked(&self) -> usize {
        self.ledger.lock().await.len()
    }

    pub async fn notify(&self, ticket: &JiraTicket, now: DateTime<Utc>) -> Result<NotifyOutcome> {
        let (Some(email), Some(key)) = (ticket.assignee_email(), assignment_key(ticket)) else {
            warn!(ticket = %ticket.key, "assignee has no visible email, skipping");
            return Ok(NotifyOutcome::Skipped);
        };

        if !self.ledger.lock().await.record(&key, now) {
            return Ok(NotifyOutcome::Duplicate);
        }

        let browse_url = format!("{}/browse/{}", self.jira_url, ticket.key);
        let message = assignment_message(ticket, &browse_url, &self.bot_name, &self.icon_emoji, now);

        match self.slack.send_dm(email, message).await {
            Ok(()) => {
                info!(ticket = %ticket.key, assignee = %email, "assignment notification sent");
                Ok(NotifyOutcome::Sent)
            }
            Err(e) => {
                self.ledger.lock().await.forget(&key);
                Err(e)
            }
        }
    }
}

pub fn assignment_message(
    ticket: &JiraTicket,
    browse_url: &str,
    bot_name: &str,
    icon_emoji: &str,
    now: DateTime<Utc>,
) -> ChatMessage {
    let attachment = Attachment {
        color: "good".to_string(),
        fields: vec![
            AttachmentField {
                title: "Ticket".to_string(),
                value: ticket.key.clone(),
                short: true,
            },
            AttachmentField {
                title: "Priority".to_string(),
                value: ticket.priority_name().to_string(),
                short: true,
            },
            AttachmentField {
                title: "Title".to_string(),
                value: escape_text(&ticket.fields.summary),
                short: false,
            },
        ],
        actions: vec![AttachmentAction {
            kind: "button".to_string(),
            text: "Open in Jira".to_string(),
            url: browse_url.to_string(),
        }],
        footer: format!("{} Bot", bot_name),
        ts: now.timestamp(),
    };

    ChatMessage {
        channel: String::new(),
        text: ":dart: New ticket assigned to you!".to_string(),
        username: bot_name.to_string(),
        icon_emoji: icon_emoji.to_string(),
        attachments: vec![attachment],
    }
}
