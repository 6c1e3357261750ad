//! Chat bot webhook.
//!
//! The operator talks to the bot in three ways:
//! - `/getface` sends one unlabeled face crop, captioned with its FaceID
//! - replying to such a photo with a name labels that face
//! - `/find <name>` sends every source image containing the named person
//!
//! Every answer is sent as a reply to the operator's message. User mistakes
//! get a short "Error" reply and a 200 so the Bot API does not redeliver;
//! catalog outages fail the request so it does.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{info, warn};

use facetag_models::FaceId;
use facetag_pipeline::PipelineError;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use crate::telegram::{escape_markdown, Command, Message, TelegramClient, Update};

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

const ERROR_REPLY: &str = "Error";
const NO_UNLABELED_REPLY: &str = "No unnamed faces found";

/// Handle one Bot API update.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> ApiResult<()> {
    let Some(bot) = state.telegram.clone() else {
        return Err(ApiError::not_found("chat bot is not configured"));
    };

    if let Some(expected) = bot.config().webhook_secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!(update_id = update.update_id, "Webhook call with bad secret token");
            return Err(ApiError::unauthorized("invalid webhook secret"));
        }
    }

    let Some(message) = update.message else {
        return Ok(());
    };

    let chat = ChatReply::new(&bot, &message);

    if let Some(original) = message.reply_to_message.as_deref() {
        metrics::record_chat_command("name");
        return handle_naming(&state, &chat, original, message.text()).await;
    }

    if message.text().is_empty() {
        return chat.text(ERROR_REPLY).await;
    }

    match Command::parse(message.text()) {
        Command::GetFace => {
            metrics::record_chat_command("getface");
            handle_get_face(&state, &chat).await
        }
        Command::Find(name) => {
            metrics::record_chat_command("find");
            handle_find(&state, &chat, name.as_deref()).await
        }
        Command::Unknown => {
            metrics::record_chat_command("unknown");
            chat.text(ERROR_REPLY).await
        }
    }
}

/// Replies to one incoming message.
struct ChatReply<'a> {
    bot: &'a TelegramClient,
    chat_id: i64,
    message_id: i64,
}

impl<'a> ChatReply<'a> {
    fn new(bot: &'a TelegramClient, message: &Message) -> Self {
        Self {
            bot,
            chat_id: message.chat.id,
            message_id: message.message_id,
        }
    }

    /// Send a Markdown reply. A reply the Bot API rejects outright is logged
    /// and dropped so the update is not redelivered forever.
    async fn text(&self, text: &str) -> ApiResult<()> {
        match self
            .bot
            .send_message(self.chat_id, text, Some(self.message_id))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_permanent() => {
                warn!(chat_id = self.chat_id, error = %e, "Bot API rejected reply");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The replied-to photo's caption is the FaceID to label.
async fn handle_naming(
    state: &AppState,
    chat: &ChatReply<'_>,
    original: &Message,
    name: &str,
) -> ApiResult<()> {
    let Some(face_id) = original
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(FaceId::from_string)
    else {
        return chat.text(ERROR_REPLY).await;
    };

    match state.labeling.assign_name(&face_id, name).await {
        Ok(()) => {
            chat.text(&format!(
                "Face {} is now named {}",
                escape_markdown(face_id.as_str()),
                escape_markdown(name.trim())
            ))
            .await
        }
        Err(e @ (PipelineError::InvalidName(_) | PipelineError::UnknownFace(_))) => {
            info!(face_id = %face_id, error = %e, "Rejected face label");
            chat.text(ERROR_REPLY).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_get_face(state: &AppState, chat: &ChatReply<'_>) -> ApiResult<()> {
    let Some(face_id) = state.labeling.next_unlabeled().await? else {
        return chat.text(NO_UNLABELED_REPLY).await;
    };

    let url = state.pipeline.face_url(face_id.as_str());
    if let Err(e) = chat
        .bot
        .send_photo(chat.chat_id, &url, Some(face_id.as_str()))
        .await
    {
        warn!(face_id = %face_id, error = %e, "Failed to send face photo");
        return chat.text(ERROR_REPLY).await;
    }
    Ok(())
}

async fn handle_find(state: &AppState, chat: &ChatReply<'_>, name: Option<&str>) -> ApiResult<()> {
    let Some(name) = name else {
        return chat.text(ERROR_REPLY).await;
    };

    let images = state.retrieval.find_images_by_name(name).await?;
    if images.is_empty() {
        return chat
            .text(&format!("Photos with {} not found", escape_markdown(name)))
            .await;
    }

    info!(name = %name, count = images.len(), "Sending matching images");
    for image in &images {
        let url = state.pipeline.image_url(image.as_str());
        if let Err(e) = chat.bot.send_photo(chat.chat_id, &url, None).await {
            warn!(image = %image, error = %e, "Failed to send image");
        }
    }
    Ok(())
}
