//! The subset of Bot API objects the bot reads and writes.

use serde::{Deserialize, Serialize};
use shared::{
    domain::{AccountId, ChatId},
    protocol::{Attachment, AttachmentKind, InboundEvent, InboundKind, Keyboard, Sender},
};

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub video: Option<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl From<&Keyboard> for InlineKeyboardMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| InlineKeyboardButton {
                            text: button.label.clone(),
                            callback_data: button.action.token().to_string(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerCallbackQueryRequest<'a> {
    pub callback_query_id: &'a str,
}

impl TgUser {
    fn sender(&self) -> Sender {
        Sender {
            account_id: AccountId(self.id),
            first_name: Some(self.first_name.clone()).filter(|name| !name.is_empty()),
            username: self.username.clone(),
        }
    }
}

impl Message {
    /// First attachment found, in document, photo, video order. Photos use the largest size.
    pub fn attachment(&self) -> Option<Attachment> {
        if let Some(document) = &self.document {
            return Some(Attachment {
                kind: AttachmentKind::Document,
                file_ref: document.file_id.clone(),
                file_name: document.file_name.clone().unwrap_or_default(),
            });
        }
        if let Some(largest) = self.photo.as_deref().and_then(|sizes| {
            sizes.iter().max_by_key(|size| {
                (
                    size.file_size.unwrap_or_default(),
                    u64::from(size.width) * u64::from(size.height),
                )
            })
        }) {
            return Some(Attachment {
                kind: AttachmentKind::Photo,
                file_ref: largest.file_id.clone(),
                file_name: String::new(),
            });
        }
        self.video.as_ref().map(|video| Attachment {
            kind: AttachmentKind::Video,
            file_ref: video.file_id.clone(),
            file_name: video.file_name.clone().unwrap_or_default(),
        })
    }
}

impl Update {
    /// Maps an update to the bot's inbound event. Updates without a human
    /// sender (channel posts, other bots, unsupported kinds) yield `None`.
    pub fn into_inbound(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            if query.from.is_bot {
                return None;
            }
            let chat_id = query
                .message
                .as_ref()
                .map(|message| ChatId(message.chat.id))
                .unwrap_or(ChatId(query.from.id));
            return Some(InboundEvent {
                sender: query.from.sender(),
                chat_id,
                kind: InboundKind::ButtonPress {
                    callback_id: query.id,
                    data: query.data,
                },
            });
        }

        let message = self.message?;
        let from = message.from.as_ref().filter(|user| !user.is_bot)?;
        let attachment = message.attachment();
        let text = message.text.clone().or_else(|| message.caption.clone());
        if text.is_none() && attachment.is_none() {
            return None;
        }
        Some(InboundEvent {
            sender: from.sender(),
            chat_id: ChatId(message.chat.id),
            kind: InboundKind::Message { text, attachment },
        })
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
