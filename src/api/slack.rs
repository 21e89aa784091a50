use crate::errors::{JiraldoError, Result};
use crate::models::slack::ChatMessage;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Slack Web API client authenticated with a bot token.
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    api_url: String,
    token: String,
}

/// Every Web API response carries `ok` and, on failure, an `error` code.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    profile: Option<SlackProfile>,
}

#[derive(Debug, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthIdentity {
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Deserialize)]
struct Empty {}

impl SlackClient {
    pub fn new(api_url: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| JiraldoError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Resolves a Slack user id from an email address.
    pub async fn lookup_user_by_email(&self, email: &str) -> Result<String> {
        let url = format!("{}/users.lookupByEmail", self.api_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("email", email)])
            .send()
            .await?;

        match Self::unwrap_envelope::<UserPayload>(response.json().await?) {
            Ok(payload) => Ok(payload.user.id),
            Err(JiraldoError::SlackApiError(code)) if code == "users_not_found" => {
                Err(JiraldoError::SlackUserNotFound(email.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Profile email of a Slack user; `None` when the bot lacks `users:read.email`.
    pub async fn user_email(&self, user_id: &str) -> Result<Option<String>> {
        let url = format!("{}/users.info", self.api_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("user", user_id)])
            .send()
            .await?;

        let payload = Self::unwrap_envelope::<UserPayload>(response.json().await?)?;
        Ok(payload
            .user
            .profile
            .and_then(|p| p.email)
            .filter(|e| !e.is_empty()))
    }

    pub async fn post_message(&self, message: &ChatMessage) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_url);

        debug!(channel = %message.channel, "posting Slack message");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await?;

        Self::unwrap_envelope::<Empty>(response.json().await?)?;
        Ok(())
    }

    /// Looks up `email` and sends `message` to that user's DM channel.
    pub async fn send_dm(&self, email: &str, mut message: ChatMessage) -> Result<()> {
        message.channel = self.lookup_user_by_email(email).await?;
        self.post_message(&message).await
    }

    pub async fn auth_test(&self) -> Result<AuthIdentity> {
        let url = format!("{}/auth.test", self.api_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::unwrap_envelope::<AuthIdentity>(response.json().await?)
    }

    fn unwrap_envelope<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
        let envelope: Envelope<T> = serde_json::from_value(value)
            .map_err(|e| JiraldoError::Other(format!("Failed to parse Slack response: {}", e)))?;

        if !envelope.ok {
            return Err(JiraldoError::SlackApiError(
                envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        envelope
            .body
            .ok_or_else(|| JiraldoError::Other("Slack response missing body".to_string()))
    }
}
