use crate::errors::{JiraldoError, Result};
use crate::models::ticket::{JiraTicket, JiraUser, SearchResponse};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

const RECENT_FIELDS: &[&str] = &[
    "key", "summary", "assignee", "status", "priority", "creator", "updated",
];
const USER_FIELDS: &[&str] = &["key", "summary", "status", "priority", "assignee", "created"];

const RECENT_MAX_RESULTS: u32 = 50;
const USER_MAX_RESULTS: u32 = 10;

#[derive(Clone)]
pub struct JiraClient {
    client: Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraClient {
    pub fn new(base_url: String, email: String, api_token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JiraldoError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            api_token,
        })
    }

    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.base_url, key)
    }

    pub async fn search(&self, jql: &str, fields: &[&str], max_results: u32) -> Result<Vec<JiraTicket>> {
        let url = format!("{}/rest/api/3/search/jql", self.base_url);

        let body = serde_json::json!({
            "jql": jql,
            "fields": fields,
            "maxResults": max_results,
        });

        debug!(%jql, max_results, "searching Jira");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let search = Self::check(response)
            .await?
            .json::<SearchResponse>()
            .await
            .map_err(|e| JiraldoError::Other(format!("Failed to parse Jira search response: {}", e)))?;

        Ok(search.issues)
    }

    /// Tickets whose assignee changed within the last `lookback_minutes`.
    pub async fn recent_assignments(&self, lookback_minutes: u64) -> Result<Vec<JiraTicket>> {
        self.search(
            &recent_assignments_jql(lookback_minutes),
            RECENT_FIELDS,
            RECENT_MAX_RESULTS,
        )
        .await
    }

    /// Open tickets assigned to `email`, newest first.
    pub async fn user_tickets(&self, email: &str) -> Result<Vec<JiraTicket>> {
        self.search(&user_tickets_jql(email), USER_FIELDS, USER_MAX_RESULTS)
            .await
    }

    pub async fn myself(&self) -> Result<JiraUser> {
        let url = format!("{}/rest/api/3/myself", self.base_url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::check(response)
            .await?
            .json::<JiraUser>()
            .await
            .map_err(|e| JiraldoError::Other(format!("Failed to parse Jira user: {}", e)))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == 401 || status == 403 {
            return Err(JiraldoError::JiraAuthFailed(status.as_u16()));
        }

        let text = response.text().await.unwrap_or_default();
        Err(JiraldoError::JiraApiError(
            status.as_u16(),
            JiraldoError::truncated_body(&text),
        ))
    }
}

pub fn recent_assignments_jql(lookback_minutes: u64) -> String {
    format!(
        "assignee changed during (-{}m, now()) AND assignee is not EMPTY",
        lookback_minutes
    )
}

pub fn user_tickets_jql(email: &str) -> String {
    let escaped = email.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "assignee = \"{}\" AND status != Done ORDER BY created DESC",
        escaped
    )
}
