use super::signature::verify_jira;
use super::AppState;
use crate::models::webhook::JiraWebhookEvent;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

/// Receives Jira issue events and DMs the new assignee.
pub async fn jira_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.settings.jira.webhook_secret {
        if let Err(e) = verify_jira(secret, &headers, &body) {
            warn!(error = %e, "rejected Jira webhook");
            return reply(
                StatusCode::UNAUTHORIZED,
                json!({"status": "unauthorized", "error": e.to_string()}),
            );
        }
    }

    let event: JiraWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                json!({"status": "invalid", "error": e.to_string()}),
            )
        }
    };

    let issue = match event.issue {
        Some(ref issue) if event.is_assignment() => issue,
        _ => {
            debug!(event = %event.webhook_event, "ignoring non-assignment webhook");
            return reply(StatusCode::ACCEPTED, json!({"status": "ignored"}));
        }
    };

    let now = Utc::now();
    if !state.hours.is_open(now) {
        info!(ticket = %issue.key, "assignment outside business hours, not notifying");
        return reply(
            StatusCode::ACCEPTED,
            json!({"status": "outside_business_hours", "ticket": issue.key}),
        );
    }

    let Some(notifier) = &state.notifier else {
        return reply(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"status": "not_configured", "error": "SLACK_BOT_TOKEN is not set"}),
        );
    };

    match notifier.notify(issue, now).await {
        Ok(outcome) => reply(
            StatusCode::OK,
            json!({"status": outcome.as_str(), "ticket": issue.key}),
        ),
        Err(e) => {
            warn!(ticket = %issue.key, error = %e, "webhook notification failed");
            reply(
                StatusCode::BAD_GATEWAY,
                json!({"status": "failed", "ticket": issue.key, "error": e.to_string()}),
            )
        }
    }
}
