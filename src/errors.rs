use std::fmt;

#[derive(Debug)]
pub enum JiraldoError {
    // Configuration errors
    ConfigInvalid(String),
    MissingCredentials(Vec<&'static str>),

    // Jira errors
    JiraAuthFailed(u16),
    JiraApiError(u16, String),

    // Slack errors
    SlackApiError(String),
    SlackUserNotFound(String),

    // Inbound request errors
    InvalidSignature(String),

    // Network errors
    NetworkError(String),

    // Generic error
    Other(String),
}

impl fmt::Display for JiraldoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JiraldoError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            JiraldoError::MissingCredentials(vars) => {
                write!(f, "Missing credentials, set: {}", vars.join(", "))
            }

            JiraldoError::JiraAuthFailed(status) => write!(
                f,
                "Jira authentication failed ({}): check JIRA_EMAIL and JIRA_API_TOKEN",
                status
            ),
            JiraldoError::JiraApiError(status, msg) => {
                write!(f, "Jira API error ({}): {}", status, msg)
            }

            JiraldoError::SlackApiError(code) => write!(f, "Slack API error: {}", code),
            JiraldoError::SlackUserNotFound(email) => {
                write!(f, "No Slack user found for {}", email)
            }

            JiraldoError::InvalidSignature(reason) => {
                write!(f, "Request signature rejected: {}", reason)
            }

            JiraldoError::NetworkError(msg) => write!(f, "Network error: {}", msg),

            JiraldoError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for JiraldoError {}

impl JiraldoError {
    /// Limits an API response body so that error messages stay loggable.
    pub fn truncated_body(body: &str) -> String {
        const MAX: usize = 200;
        if body.chars().count() <= MAX {
            body.to_string()
        } else {
            let cut: String = body.chars().take(MAX).collect();
            format!("{}...", cut)
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for JiraldoError {
    fn from(err: anyhow::Error) -> Self {
        JiraldoError::Other(err.to_string())
    }
}

impl From<config::ConfigError> for JiraldoError {
    fn from(err: config::ConfigError) -> Self {
        JiraldoError::ConfigInvalid(err.to_string())
    }
}

impl From<reqwest::Error> for JiraldoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            JiraldoError::NetworkError(err.to_string())
        } else if let Some(status) = err.status() {
            if status == 401 || status == 403 {
                JiraldoError::JiraAuthFailed(status.as_u16())
            } else {
                JiraldoError::Other(err.to_string())
            }
        } else {
            JiraldoError::Other(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, JiraldoError>;
