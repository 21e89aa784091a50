//! HTTP surface: slash commands, Jira webhooks and debug endpoints.

pub mod handlers;
pub mod signature;
pub mod slash;
pub mod webhook;

use crate::api::jira::JiraClient;
use crate::api::slack::SlackClient;
use crate::config::settings::Settings;
use crate::errors::Result;
use crate::notify::hours::BusinessHours;
use crate::notify::ledger::NotificationLedger;
use crate::notify::poller::Poller;
use crate::notify::Notifier;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers.
pub struct AppState {
    pub settings: Settings,
    pub hours: BusinessHours,
    /// `None` until Jira credentials are configured.
    pub jira: Option<JiraClient>,
    /// `None` until a Slack bot token is configured.
    pub slack: Option<SlackClient>,
    pub notifier: Option<Arc<Notifier>>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let hours = BusinessHours::from_settings(&settings)?;

        let jira = match settings.jira_credentials() {
            Some((email, token)) => Some(JiraClient::new(
                settings.jira.url.clone(),
                email.to_string(),
                token.to_string(),
                Duration::from_secs(settings.jira.timeout_secs),
            )?),
            None => None,
        };

        let slack = match &settings.slack.bot_token {
            Some(token) => Some(SlackClient::new(
                settings.slack.api_url.clone(),
                token.clone(),
            )?),
            None => None,
        };

        let notifier = slack.clone().map(|slack| {
            Arc::new(Notifier::new(
                slack,
                settings.jira.url.clone(),
                settings.slack.bot_name.clone(),
                settings.slack.icon_emoji.clone(),
                NotificationLedger::for_polling(
                    settings.notifications.interval_minutes,
                    settings.notifications.lookback_minutes,
                ),
            ))
        });

        Ok(Self {
            settings,
            hours,
            jira,
            slack,
            notifier,
        })
    }

    pub fn poller_enabled(&self) -> bool {
        self.settings.notifications.polling && self.jira.is_some() && self.notifier.is_some()
    }

    /// Builds the poller when polling is on and every credential is present.
    pub fn poller(&self) -> Option<Poller> {
        if !self.poller_enabled() {
            return None;
        }
        let jira = self.jira.clone()?;
        let notifier = self.notifier.clone()?;

        Some(Poller::new(
            jira,
            notifier,
            self.hours,
            self.settings.notifications.interval_minutes,
            self.settings.notifications.lookback_minutes,
        ))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health))
        .route("/debug", get(handlers::debug_info))
        .route("/test-user/:username", get(handlers::test_user))
        .route("/jiraldo", post(slash::jiraldo_command))
        .route("/webhooks/jira", post(webhook::jira_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = &state.settings.server;
    let listener = tokio::net::TcpListener::bind((server.host.as_str(), server.port)).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix hosts.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::signature::{jira_signature, slack_signature};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Timelike, Utc};
    use mockito::Matcher;
    use serde_json::Value;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_sources(None, move |key| env.get(key).cloned()).unwrap()
    }

    /// Fully configured state talking to `url`, open around the clock.
    fn configured(url: &str, extra: &[(&str, &str)]) -> Arc<AppState> {
        let mut vars = vec![
            ("JIRA_BASE_URL", url),
            ("JIRA_EMAIL", "bot@acme.com"),
            ("JIRA_API_TOKEN", "jira-token"),
            ("SLACK_API_URL", url),
            ("SLACK_BOT_TOKEN", "xoxb-test"),
            ("EMAIL_DOMAIN", "@acme.com"),
            ("NOTIFICATION_START_HOUR", "0"),
            ("NOTIFICATION_END_HOUR", "23"),
            ("NOTIFICATION_UTC_OFFSET", "+00:00"),
        ];
        vars.extend_from_slice(extra);
        Arc::new(AppState::from_settings(settings(&vars)).unwrap())
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn slash_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/jiraldo")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn webhook_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhooks/jira")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const ASSIGNED_EVENT: &str = r#"{
        "webhookEvent": "jira:issue_updated",
        "issue": {"key": "PAY-9", "fields": {"summary": "Webhook ticket",
            "priority": {"name": "Low"},
            "assignee": {"accountId": "a9", "displayName": "Maria", "emailAddress": "maria@acme.com"}}},
        "changelog": {"items": [{"field": "assignee", "to": "a9"}]}
    }"#;

    #[test]
    fn test_unconfigured_state_has_no_poller() {
        let state = AppState::from_settings(settings(&[])).unwrap();
        assert!(state.jira.is_none());
        assert!(state.notifier.is_none());
        assert!(!state.poller_enabled());
        assert!(state.poller().is_none());
    }

    #[test]
    fn test_polling_can_be_disabled() {
        let state = configured("http://127.0.0.1:9", &[("POLLING_ENABLED", "false")]);
        assert!(state.jira.is_some());
        assert!(state.poller().is_none());
    }

    #[tokio::test]
    async fn test_serve_binds_hostnames() {
        let state = Arc::new(
            AppState::from_settings(settings(&[("HOST", "localhost"), ("PORT", "0")])).unwrap(),
        );
        serve(state, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_health_and_home() {
        let app = router(Arc::new(AppState::from_settings(settings(&[])).unwrap()));

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].is_string());

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "running");
    }

    #[tokio::test]
    async fn test_debug_reports_missing_credentials() {
        let app = router(Arc::new(AppState::from_settings(settings(&[])).unwrap()));

        let response = app
            .oneshot(Request::get("/debug").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;

        assert_eq!(json["environment_check"]["SLACK_BOT_TOKEN"], "missing");
        assert_eq!(json["environment_check"]["JIRA_EMAIL"], "missing");
        assert_eq!(json["jira_connection"]["status"], "not_configured");
        assert_eq!(json["notifications"]["polling"], false);
    }

    #[tokio::test]
    async fn test_debug_checks_connections() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/api/3/myself")
            .with_status(200)
            .with_body(r#"{"accountId": "5b10ac8d82e05b22cc7d4ef5", "displayName": "Jiraldo Bot"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/auth.test")
            .with_status(200)
            .with_body(r#"{"ok": true, "team": "Acme", "user": "jiraldo"}"#)
            .create_async()
            .await;

        let app = router(configured(&server.url(), &[]));
        let response = app
            .oneshot(Request::get("/debug").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;

        assert_eq!(json["jira_connection"]["status"], "connected");
        assert_eq!(json["jira_connection"]["account_id"], "5b10ac8d82e05b22cc7d...");
        assert_eq!(json["slack_connection"]["team"], "Acme");
        assert_eq!(json["environment_check"]["JIRA_API_TOKEN"], "configured");
    }

    #[tokio::test]
    async fn test_test_user_lists_tickets() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/api/3/search/jql")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "jql": "assignee = \"maria@acme.com\" AND status != Done ORDER BY created DESC"
            })))
            .with_status(200)
            .with_body(r#"{"issues": [{"key": "PAY-1", "fields": {"summary": "One",
                "status": {"name": "To Do"}, "created": "2024-05-02T10:00:00.000-0300"}}]}"#)
            .create_async()
            .await;

        let app = router(configured(&server.url(), &[]));
        let response = app
            .oneshot(Request::get("/test-user/maria").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["user_email"], "maria@acme.com");
        assert_eq!(json["total_found"], 1);
        assert_eq!(json["tickets"][0]["key"], "PAY-1");
        assert_eq!(json["tickets"][0]["status"], "To Do");
    }

    #[tokio::test]
    async fn test_slash_tickets() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/api/3/search/jql")
            .with_status(200)
            .with_body(r#"{"issues": [{"key": "PAY-1", "fields": {"summary": "One",
                "status": {"name": "In Progress"}}}]}"#)
            .create_async()
            .await;

        let app = router(configured(&server.url(), &[]));
        let response = app
            .oneshot(slash_request("command=%2Fjiraldo&text=tickets&user_id=U1&user_name=maria"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["response_type"], "ephemeral");
        assert_eq!(
            json["text"],
            ":dart: Your open tickets (1):\n• *PAY-1*: One _(In Progress)_\n"
        );
    }

    #[tokio::test]
    async fn test_slash_resolves_email_through_slack() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.info")
            .match_query(Matcher::UrlEncoded("user".into(), "U77".into()))
            .with_status(200)
            .with_body(r#"{"ok": true, "user": {"id": "U77", "profile": {"email": "joao@acme.com"}}}"#)
            .create_async()
            .await;
        let search = server
            .mock("POST", "/rest/api/3/search/jql")
            .match_body(Matcher::Regex("joao@acme.com".to_string()))
            .with_status(200)
            .with_body(r#"{"issues": []}"#)
            .create_async()
            .await;

        let url = server.url();
        let vars = [
            ("JIRA_BASE_URL", url.as_str()),
            ("JIRA_EMAIL", "bot@acme.com"),
            ("JIRA_API_TOKEN", "jira-token"),
            ("SLACK_API_URL", url.as_str()),
            ("SLACK_BOT_TOKEN", "xoxb-test"),
        ];
        let app = router(Arc::new(AppState::from_settings(settings(&vars)).unwrap()));

        let response = app
            .oneshot(slash_request("text=tickets&user_id=U77&user_name=joao"))
            .await
            .unwrap();
        let json = body_json(response).await;

        search.assert_async().await;
        assert_eq!(json["text"], ":tada: You have no open tickets!");
    }

    #[tokio::test]
    async fn test_slash_unknown_and_unconfigured() {
        let app = router(Arc::new(AppState::from_settings(settings(&[])).unwrap()));

        let response = app
            .clone()
            .oneshot(slash_request("text=deploy&user_name=maria"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json["text"].as_str().unwrap().contains("/jiraldo help"));

        let response = app
            .oneshot(slash_request("text=tickets&user_name=maria"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["text"].as_str().unwrap().starts_with(":x: Error: Missing credentials"));
    }

    #[tokio::test]
    async fn test_slash_signature_enforced() {
        let state = configured("http://127.0.0.1:9", &[("SLACK_SIGNING_SECRET", "signing")]);
        let app = router(state);
        let body = "text=help&user_name=maria";

        let response = app.clone().oneshot(slash_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let ts = Utc::now().timestamp().to_string();
        let sig = slack_signature("signing", &ts, body.as_bytes()).unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/jiraldo")
            .header("x-slack-request-timestamp", ts)
            .header("x-slack-signature", sig)
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["text"].as_str().unwrap().contains("Jiraldo commands"));
    }

    #[tokio::test]
    async fn test_webhook_notifies_assignee() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.lookupByEmail")
            .match_query(Matcher::UrlEncoded("email".into(), "maria@acme.com".into()))
            .with_status(200)
            .with_body(r#"{"ok": true, "user": {"id": "U1"}}"#)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::PartialJson(serde_json::json!({"channel": "U1"})))
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .expect(1)
            .create_async()
            .await;

        let app = router(configured(&server.url(), &[]));

        let response = app.clone().oneshot(webhook_request(ASSIGNED_EVENT)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "sent");

        let response = app.oneshot(webhook_request(ASSIGNED_EVENT)).await.unwrap();
        assert_eq!(body_json(response).await["status"], "duplicate");

        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_notifies_on_created_issue() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.lookupByEmail")
            .match_query(Matcher::UrlEncoded("email".into(), "joao@acme.com".into()))
            .with_status(200)
            .with_body(r#"{"ok": true, "user": {"id": "U2"}}"#)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::PartialJson(serde_json::json!({"channel": "U2"})))
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .expect(1)
            .create_async()
            .await;

        let created = r#"{
            "webhookEvent": "jira:issue_created",
            "issue": {"key": "PAY-10", "fields": {"summary": "Brand new",
                "assignee": {"accountId": "a10", "displayName": "Joao", "emailAddress": "joao@acme.com"}}}
        }"#;

        let response = router(configured(&server.url(), &[]))
            .oneshot(webhook_request(created))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "sent");
        assert_eq!(json["ticket"], "PAY-10");

        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_reports_failed_delivery() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users.lookupByEmail")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"ok": false, "error": "ratelimited"}"#)
            .create_async()
            .await;

        let response = router(configured(&server.url(), &[]))
            .oneshot(webhook_request(ASSIGNED_EVENT))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json = body_json(response).await;
        assert_eq!(json["status"], "failed");
        assert_eq!(json["ticket"], "PAY-9");
        assert!(json["error"].as_str().unwrap().contains("ratelimited"));
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events() {
        let app = router(configured("http://127.0.0.1:9", &[]));
        let response = app
            .oneshot(webhook_request(
                r#"{"webhookEvent": "jira:issue_updated",
                    "issue": {"key": "PAY-1", "fields": {"summary": "s"}},
                    "changelog": {"items": [{"field": "status", "to": "3"}]}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn test_webhook_outside_business_hours() {
        let closed_hour = ((Utc::now().hour() + 2) % 24).to_string();
        let state = configured(
            "http://127.0.0.1:9",
            &[
                ("NOTIFICATION_START_HOUR", closed_hour.as_str()),
                ("NOTIFICATION_END_HOUR", closed_hour.as_str()),
            ],
        );

        let response = router(state)
            .oneshot(webhook_request(ASSIGNED_EVENT))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "outside_business_hours");
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_payload_and_signature() {
        let app = router(configured("http://127.0.0.1:9", &[]));
        let response = app.oneshot(webhook_request("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let signed = router(configured(
            "http://127.0.0.1:9",
            &[("JIRA_WEBHOOK_SECRET", "hook-secret")],
        ));
        let response = signed
            .clone()
            .oneshot(webhook_request(ASSIGNED_EVENT))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let sig = jira_signature("hook-secret", br#"{"webhookEvent": "comment_created"}"#).unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/jira")
            .header("x-hub-signature", sig)
            .body(Body::from(r#"{"webhookEvent": "comment_created"}"#))
            .unwrap();
        let response = signed.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
