use serde::{Deserialize, Serialize};

/// Form fields Slack sends with a slash command invocation.
#[derive(Debug, Default, Clone)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
}

impl SlashCommand {
    pub fn from_form(body: &[u8]) -> Self {
        let mut cmd = SlashCommand::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "command" => cmd.command = value.into_owned(),
                "text" => cmd.text = value.into_owned(),
                "user_id" => cmd.user_id = value.into_owned(),
                "user_name" => cmd.user_name = value.into_owned(),
                _ => {}
            }
        }
        cmd
    }
}

/// Escapes the three characters Slack treats as control sequences in message text.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SlashResponse {
    pub response_type: String,
    pub text: String,
}

impl SlashResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub channel: String,
    pub text: String,
    pub username: String,
    pub icon_emoji: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct Attachment {
    pub color: String,
    pub fields: Vec<AttachmentField>,
    pub actions: Vec<AttachmentAction>,
    pub footer: String,
    pub ts: i64,
}

#[derive(Debug, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Serialize)]
pub struct AttachmentAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub url: String,
}
