use super::ticket::JiraTicket;
use serde::Deserialize;

pub const ISSUE_CREATED: &str = "jira:issue_created";
pub const ISSUE_UPDATED: &str = "jira:issue_updated";

/// Body Jira POSTs to a registered webhook.
#[derive(Debug, Deserialize)]
pub struct JiraWebhookEvent {
    #[serde(rename = "webhookEvent", default)]
    pub webhook_event: String,
    #[serde(default)]
    pub issue: Option<JiraTicket>,
    #[serde(default)]
    pub changelog: Option<Changelog>,
}

#[derive(Debug, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub items: Vec<ChangelogItem>,
}

#[derive(Debug, Deserialize)]
pub struct ChangelogItem {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub to: Option<String>,
}

impl JiraWebhookEvent {
    pub fn is_assignment(&self) -> bool {
        match self.webhook_event.as_str() {
            ISSUE_UPDATED => self.changelog.as_ref().is_some_and(|log| {
                log.items.iter().any(|item| {
                    item.field.eq_ignore_ascii_case("assignee")
                        && item.to.as_deref().is_some_and(|to| !to.is_empty())
                })
            }),
            ISSUE_CREATED => self
                .issue
                .as_ref()
                .is_some_and(|issue| issue.fields.assignee.is_some()),
            _ => false,
        }
    }
}
