use super::AppState;
use crate::api::jira::user_tickets_jql;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

fn presence(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "configured"
    } else {
        "missing"
    }
}

/// Shortens an account id so `/debug` doesn't echo it in full.
fn clip_account_id(id: &str) -> String {
    let clipped: String = id.chars().take(20).collect();
    format!("{}...", clipped)
}

pub async fn home() -> impl IntoResponse {
    Json(json!({
        "message": "Jiraldo bot online",
        "status": "running",
        "debug": "/debug",
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "jiraldo": "online",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn debug_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = &state.settings;

    let jira_connection = match &state.jira {
        None => json!({"status": "not_configured"}),
        Some(jira) => match jira.myself().await {
            Ok(me) => json!({
                "status": "connected",
                "user": me.display_name,
                "email": me.email_address.unwrap_or_else(|| "N/A".to_string()),
                "account_id": clip_account_id(&me.account_id),
            }),
            Err(e) => json!({"status": "error", "error": e.to_string()}),
        },
    };

    let slack_connection = match &state.slack {
        None => json!({"status": "not_configured"}),
        Some(slack) => match slack.auth_test().await {
            Ok(who) => json!({"status": "connected", "team": who.team, "bot": who.user}),
            Err(e) => json!({"status": "error", "error": e.to_string()}),
        },
    };

    let tracked = match &state.notifier {
        Some(notifier) => notifier.tracked().await,
        None => 0,
    };

    Json(json!({
        "timestamp": Utc::now().to_rfc3339(),
        "bot_status": "online",
        "environment_check": {
            "SLACK_BOT_TOKEN": presence(&settings.slack.bot_token),
            "SLACK_SIGNING_SECRET": presence(&settings.slack.signing_secret),
            "JIRA_EMAIL": settings.jira.email.as_deref().unwrap_or("missing"),
            "JIRA_API_TOKEN": presence(&settings.jira.api_token),
            "JIRA_WEBHOOK_SECRET": presence(&settings.jira.webhook_secret),
            "JIRA_BASE_URL": settings.jira.url,
            "EMAIL_DOMAIN": settings.notifications.email_domain.as_deref().unwrap_or("unset"),
        },
        "notifications": {
            "polling": state.poller_enabled(),
            "interval_minutes": settings.notifications.interval_minutes,
            "business_hours": state.hours.to_string(),
            "open_now": state.hours.is_open(Utc::now()),
            "tracked_assignments": tracked,
        },
        "jira_connection": jira_connection,
        "slack_connection": slack_connection,
    }))
}

/// Open tickets of a user, for checking the Jira side without Slack.
pub async fn test_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> (StatusCode, Json<Value>) {
    let Some(jira) = &state.jira else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "JIRA_EMAIL and JIRA_API_TOKEN are not configured"})),
        );
    };

    let Some(email) = state.settings.email_for(&username) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "EMAIL_DOMAIN is not set; pass a full email address"})),
        );
    };

    let jql = user_tickets_jql(&email);
    match jira.user_tickets(&email).await {
        Ok(tickets) => {
            let listed: Vec<Value> = tickets
                .iter()
                .map(|t| {
                    json!({
                        "key": t.key,
                        "summary": t.fields.summary,
                        "status": t.status_name(),
                        "assignee": t.assignee_email(),
                        "created": t.fields.created,
                    })
                })
                .collect();

            (
                StatusCode::OK,
                Json(json!({
                    "user_email": email,
                    "jql": jql,
                    "total_found": listed.len(),
                    "tickets": listed,
                    "note": "Only tickets where the user is the assignee are listed",
                })),
            )
        }
        Err(e) => {
            warn!(user = %email, error = %e, "test-user lookup failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": e.to_string(), "user_email": email, "jql": jql})),
            )
        }
    }
}
