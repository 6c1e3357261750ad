//! Bot API payloads.
//!
//! Only the fields the bot reads or writes are modeled; everything else in
//! an update is ignored.

use serde::{Deserialize, Serialize};

/// Incoming webhook update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    /// Absent for update kinds the bot does not handle (edits, callbacks, ...)
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Text content, empty when the message has none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("").trim()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    pub parse_mode: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SendPhotoRequest<'a> {
    pub chat_id: i64,
    pub photo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<&'a str>,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
}
