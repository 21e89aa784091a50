use crate::errors::{JiraldoError, Result};
use chrono::FixedOffset;
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MASK: &str = "********";

/// Upper bound for the lookback, and through it the poll interval.
const MAX_WINDOW_MINUTES: u64 = 24 * 60;

/// Environment variables and the settings key each one overrides.
const ENV_KEYS: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("JIRA_BASE_URL", "jira.url"),
    ("JIRA_EMAIL", "jira.email"),
    ("JIRA_API_TOKEN", "jira.api_token"),
    ("JIRA_WEBHOOK_SECRET", "jira.webhook_secret"),
    ("JIRA_TIMEOUT_SECS", "jira.timeout_secs"),
    ("SLACK_API_URL", "slack.api_url"),
    ("SLACK_BOT_TOKEN", "slack.bot_token"),
    ("SLACK_SIGNING_SECRET", "slack.signing_secret"),
    ("SLACK_BOT_NAME", "slack.bot_name"),
    ("SLACK_ICON_EMOJI", "slack.icon_emoji"),
    ("POLLING_ENABLED", "notifications.polling"),
    ("CHECK_INTERVAL_MINUTES", "notifications.interval_minutes"),
    ("LOOKBACK_MINUTES", "notifications.lookback_minutes"),
    ("NOTIFICATION_START_HOUR", "notifications.start_hour"),
    ("NOTIFICATION_END_HOUR", "notifications.end_hour"),
    ("NOTIFICATION_UTC_OFFSET", "notifications.utc_offset"),
    ("EMAIL_DOMAIN", "notifications.email_domain"),
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub jira: JiraConfig,
    pub slack: SlackConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JiraConfig {
    pub url: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    pub api_url: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub signing_secret: Option<String>,
    pub bot_name: String,
    pub icon_emoji: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub polling: bool,
    pub interval_minutes: u64,
    pub lookback_minutes: u64,
    pub start_hour: u32,
    pub end_hour: u32,
    /// `±HH:MM`; host local time when unset.
    #[serde(default)]
    pub utc_offset: Option<String>,
    /// Appended to Slack user names to form Jira emails, e.g. `@company.com`.
    #[serde(default)]
    pub email_domain: Option<String>,
}

impl Settings {
    /// Loads settings from `jiraldo.toml` (or `path`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_sources(path, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000_i64)?
            .set_default("jira.url", "https://your-domain.atlassian.net")?
            .set_default("jira.timeout_secs", 30_i64)?
            .set_default("slack.api_url", "https://slack.com/api")?
            .set_default("slack.bot_name", "Jiraldo")?
            .set_default("slack.icon_emoji", ":robot_face:")?
            .set_default("notifications.polling", true)?
            .set_default("notifications.interval_minutes", 2_i64)?
            .set_default("notifications.lookback_minutes", 3_i64)?
            .set_default("notifications.start_hour", 8_i64)?
            .set_default("notifications.end_hour", 18_i64)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("jiraldo").required(false)),
        };

        for (var, key) in ENV_KEYS {
            if let Some(value) = env(var).filter(|v| !v.trim().is_empty()) {
                builder = builder.set_override(*key, value.trim().to_string())?;
            }
        }

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    fn normalize(&mut self) {
        self.jira.url = self.jira.url.trim_end_matches('/').to_string();
        self.slack.api_url = self.slack.api_url.trim_end_matches('/').to_string();

        for secret in [
            &mut self.jira.email,
            &mut self.jira.api_token,
            &mut self.jira.webhook_secret,
            &mut self.slack.bot_token,
            &mut self.slack.signing_secret,
            &mut self.notifications.utc_offset,
            &mut self.notifications.email_domain,
        ] {
            if secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *secret = None;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = &self.notifications;

        if n.end_hour > 23 {
            return Err(JiraldoError::ConfigInvalid(format!(
                "notifications.end_hour must be 0-23, got {}",
                n.end_hour
            )));
        }
        if n.start_hour > n.end_hour {
            return Err(JiraldoError::ConfigInvalid(format!(
                "notifications.start_hour ({}) is after end_hour ({})",
                n.start_hour, n.end_hour
            )));
        }
        if n.interval_minutes == 0 {
            return Err(JiraldoError::ConfigInvalid(
                "notifications.interval_minutes must be at least 1".to_string(),
            ));
        }
        if n.lookback_minutes < n.interval_minutes {
            return Err(JiraldoError::ConfigInvalid(format!(
                "notifications.lookback_minutes ({}) must cover the poll interval ({})",
                n.lookback_minutes, n.interval_minutes
            )));
        }
        if n.lookback_minutes > MAX_WINDOW_MINUTES {
            return Err(JiraldoError::ConfigInvalid(format!(
                "notifications.lookback_minutes must be at most {}, got {}",
                MAX_WINDOW_MINUTES, n.lookback_minutes
            )));
        }
        if let Some(domain) = &n.email_domain {
            if !domain.starts_with('@') {
                return Err(JiraldoError::ConfigInvalid(format!(
                    "notifications.email_domain must start with '@', got '{}'",
                    domain
                )));
            }
        }
        self.utc_offset()?;

        Ok(())
    }

    pub fn utc_offset(&self) -> Result<Option<FixedOffset>> {
        match &self.notifications.utc_offset {
            None => Ok(None),
            Some(raw) => raw.parse::<FixedOffset>().map(Some).map_err(|_| {
                JiraldoError::ConfigInvalid(format!(
                    "notifications.utc_offset must look like -03:00, got '{}'",
                    raw
                ))
            }),
        }
    }

    /// Environment variables that still need to be set for polling to run.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.slack.bot_token.is_none() {
            missing.push("SLACK_BOT_TOKEN");
        }
        if self.jira.email.is_none() {
            missing.push("JIRA_EMAIL");
        }
        if self.jira.api_token.is_none() {
            missing.push("JIRA_API_TOKEN");
        }
        missing
    }

    pub fn jira_credentials(&self) -> Option<(&str, &str)> {
        match (&self.jira.email, &self.jira.api_token) {
            (Some(email), Some(token)) => Some((email.as_str(), token.as_str())),
            _ => None,
        }
    }

    /// Maps a Slack user name to the Jira email. Full emails pass through.
    pub fn email_for(&self, username: &str) -> Option<String> {
        let username = username.trim();
        if username.is_empty() {
            return None;
        }
        if username.contains('@') {
            return Some(username.to_string());
        }
        self.notifications
            .email_domain
            .as_ref()
            .map(|domain| format!("{}{}", username, domain))
    }

    /// Copy safe to print or log.
    pub fn masked(&self) -> Settings {
        let mask = |value: &Option<String>| value.as_ref().map(|_| MASK.to_string());

        let mut masked = self.clone();
        masked.jira.api_token = mask(&self.jira.api_token);
        masked.jira.webhook_secret = mask(&self.jira.webhook_secret);
        masked.slack.bot_token = mask(&self.slack.bot_token);
        masked.slack.signing_secret = mask(&self.slack.signing_secret);
        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_sources(None, move |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = load_with(&[]).unwrap();
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.slack.api_url, "https://slack.com/api");
        assert_eq!(settings.notifications.interval_minutes, 2);
        assert_eq!(settings.notifications.lookback_minutes, 3);
        assert_eq!(settings.notifications.start_hour, 8);
        assert_eq!(settings.notifications.end_hour, 18);
        assert!(settings.notifications.polling);
        assert_eq!(
            settings.missing_credentials(),
            vec!["SLACK_BOT_TOKEN", "JIRA_EMAIL", "JIRA_API_TOKEN"]
        );
    }

    #[test]
    fn test_environment_overrides() {
        let settings = load_with(&[
            ("PORT", "8080"),
            ("JIRA_BASE_URL", "https://acme.atlassian.net/"),
            ("JIRA_EMAIL", "bot@acme.com"),
            ("JIRA_API_TOKEN", "jira-token"),
            ("SLACK_BOT_TOKEN", "xoxb-1"),
            ("EMAIL_DOMAIN", "@acme.com"),
            ("NOTIFICATION_UTC_OFFSET", "-03:00"),
            ("POLLING_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.jira.url, "https://acme.atlassian.net");
        assert_eq!(settings.jira_credentials(), Some(("bot@acme.com", "jira-token")));
        assert!(settings.missing_credentials().is_empty());
        assert!(!settings.notifications.polling);
        assert_eq!(
            settings.utc_offset().unwrap(),
            Some(FixedOffset::west_opt(3 * 3600).unwrap())
        );
    }

    #[test]
    fn test_blank_variables_are_ignored() {
        let settings = load_with(&[("SLACK_BOT_TOKEN", "   ")]).unwrap();
        assert!(settings.slack.bot_token.is_none());
    }

    #[test]
    fn test_rejects_inverted_window() {
        let result = load_with(&[
            ("NOTIFICATION_START_HOUR", "19"),
            ("NOTIFICATION_END_HOUR", "8"),
        ]);
        assert!(matches!(result, Err(JiraldoError::ConfigInvalid(_))));
    }

    #[test]
    fn test_rejects_lookback_shorter_than_interval() {
        let result = load_with(&[("CHECK_INTERVAL_MINUTES", "5")]);
        assert!(matches!(result, Err(JiraldoError::ConfigInvalid(_))));
    }

    #[test]
    fn test_rejects_windows_longer_than_a_day() {
        let result = load_with(&[("LOOKBACK_MINUTES", "1441")]);
        assert!(matches!(result, Err(JiraldoError::ConfigInvalid(_))));

        let result = load_with(&[
            ("CHECK_INTERVAL_MINUTES", "100000"),
            ("LOOKBACK_MINUTES", "100000"),
        ]);
        assert!(matches!(result, Err(JiraldoError::ConfigInvalid(_))));

        assert!(load_with(&[
            ("CHECK_INTERVAL_MINUTES", "1440"),
            ("LOOKBACK_MINUTES", "1440"),
        ])
        .is_ok());
    }

    #[test]
    fn test_rejects_bad_offset_and_domain() {
        assert!(load_with(&[("NOTIFICATION_UTC_OFFSET", "Brazil")]).is_err());
        assert!(load_with(&[("EMAIL_DOMAIN", "acme.com")]).is_err());
    }

    #[test]
    fn test_email_for() {
        let settings = load_with(&[("EMAIL_DOMAIN", "@acme.com")]).unwrap();
        assert_eq!(settings.email_for("maria"), Some("maria@acme.com".to_string()));
        assert_eq!(
            settings.email_for("joao@other.com"),
            Some("joao@other.com".to_string())
        );
        assert_eq!(settings.email_for(""), None);

        let no_domain = load_with(&[]).unwrap();
        assert_eq!(no_domain.email_for("maria"), None);
    }

    #[test]
    fn test_masked_hides_secrets() {
        let settings = load_with(&[
            ("JIRA_EMAIL", "bot@acme.com"),
            ("JIRA_API_TOKEN", "jira-token"),
            ("SLACK_BOT_TOKEN", "xoxb-1"),
        ])
        .unwrap();

        let toml_str = toml::to_string(&settings.masked()).unwrap();
        assert!(toml_str.contains("bot@acme.com"));
        assert!(!toml_str.contains("jira-token"));
        assert!(!toml_str.contains("xoxb-1"));
        assert!(toml_str.contains(MASK));
    }
}
