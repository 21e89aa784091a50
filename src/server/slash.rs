use super::signature::verify_slack;
use super::AppState;
use crate::errors::{JiraldoError, Result};
use crate::models::slack::{escape_text, SlashCommand, SlashResponse};
use crate::models::ticket::JiraTicket;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Tickets listed inline; the rest are summarised as a count.
const LISTED_TICKETS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashAction {
    Tickets,
    Help,
    Unknown,
}

impl SlashAction {
    pub fn parse(text: &str) -> Self {
        let text = text.trim().to_lowercase();
        if text.contains("tickets") || text.contains("mine") {
            SlashAction::Tickets
        } else if text.is_empty() || text.contains("help") {
            SlashAction::Help
        } else {
            SlashAction::Unknown
        }
    }
}

pub fn help_text() -> String {
    [
        ":robot_face: *Jiraldo commands:*",
        "• `/jiraldo tickets` - your open tickets",
        "• `/jiraldo help` - this help",
        "",
        "*Automatic notifications:*",
        "• You get a DM when a ticket is assigned to you during business hours.",
        "",
        "*Debug:* `/debug` on the bot's host",
    ]
    .join("\n")
}

pub fn render_ticket_list(tickets: &[JiraTicket]) -> String {
    if tickets.is_empty() {
        return ":tada: You have no open tickets!".to_string();
    }

    let mut text = format!(":dart: Your open tickets ({}):\n", tickets.len());
    for ticket in tickets.iter().take(LISTED_TICKETS) {
        text.push_str(&format!(
            "• *{}*: {} _({})_\n",
            ticket.key,
            escape_text(&ticket.fields.summary),
            escape_text(ticket.status_name())
        ));
    }

    if tickets.len() > LISTED_TICKETS {
        text.push_str(&format!(
            "\n... and {} more tickets",
            tickets.len() - LISTED_TICKETS
        ));
    }

    text
}

pub async fn jiraldo_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.settings.slack.signing_secret {
        if let Err(e) = verify_slack(secret, &headers, &body, Utc::now().timestamp()) {
            warn!(error = %e, "rejected slash command");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    }

    let cmd = SlashCommand::from_form(&body);
    info!(command = %cmd.command, user = %cmd.user_name, text = %cmd.text, "slash command received");

    let text = match SlashAction::parse(&cmd.text) {
        SlashAction::Help => help_text(),
        SlashAction::Unknown => {
            ":thinking_face: Unknown command. Try `/jiraldo help`".to_string()
        }
        SlashAction::Tickets => match list_tickets(&state, &cmd).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user = %cmd.user_name, error = %e, "failed to list tickets");
                format!(":x: Error: {}", e)
            }
        },
    };

    Json(SlashResponse::ephemeral(text)).into_response()
}

async fn list_tickets(state: &AppState, cmd: &SlashCommand) -> Result<String> {
    let jira = state
        .jira
        .as_ref()
        .ok_or_else(|| JiraldoError::MissingCredentials(vec!["JIRA_EMAIL", "JIRA_API_TOKEN"]))?;

    let email = resolve_email(state, cmd).await?;
    let tickets = jira.user_tickets(&email).await?;
    Ok(render_ticket_list(&tickets))
}

/// Configured domain wins; otherwise ask Slack for the caller's profile email.
async fn resolve_email(state: &AppState, cmd: &SlashCommand) -> Result<String> {
    if let Some(email) = state.settings.email_for(&cmd.user_name) {
        return Ok(email);
    }

    let slack = state
        .slack
        .as_ref()
        .ok_or_else(|| JiraldoError::MissingCredentials(vec!["SLACK_BOT_TOKEN"]))?;

    slack.user_email(&cmd.user_id).await?.ok_or_else(|| {
        JiraldoError::Other(
            "Couldn't find your email. Set EMAIL_DOMAIN or grant the bot users:read.email"
                .to_string(),
        )
    })
}
