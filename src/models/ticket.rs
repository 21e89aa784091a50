use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JiraTicket {
    pub key: String,
    pub fields: TicketFields,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignee: Option<JiraUser>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Status {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Priority {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JiraUser {
    #[serde(rename = "accountId", default)]
    pub account_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    /// Hidden by Jira Cloud when the user's profile visibility forbids it.
    #[serde(rename = "emailAddress", default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<JiraTicket>,
}

impl JiraTicket {
    pub fn status_name(&self) -> &str {
        self.fields
            .status
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("Unknown")
    }

    pub fn priority_name(&self) -> &str {
        self.fields
            .priority
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("None")
    }

    pub fn assignee_email(&self) -> Option<&str> {
        self.fields
            .assignee
            .as_ref()
            .and_then(|a| a.email_address.as_deref())
            .filter(|e| !e.is_empty())
    }
}
