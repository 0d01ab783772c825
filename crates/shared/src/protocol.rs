use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, ChatId};

/// Who sent an inbound update, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Sender {
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.username.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or("friend")
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Document,
    Photo,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file_ref: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundKind {
    /// A chat message. `text` holds the body or the caption of an attachment.
    Message {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        attachment: Option<Attachment>,
    },
    ButtonPress {
        callback_id: String,
        #[serde(default)]
        data: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender: Sender,
    pub chat_id: ChatId,
    pub kind: InboundKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    ListTasks,
    AddTask,
    ListEvents,
    AddEvent,
    ListFiles,
    UploadFile,
    SendMessageToAllPrompt,
}

impl ButtonAction {
    pub const ALL: [ButtonAction; 7] = [
        ButtonAction::ListTasks,
        ButtonAction::AddTask,
        ButtonAction::ListEvents,
        ButtonAction::AddEvent,
        ButtonAction::ListFiles,
        ButtonAction::UploadFile,
        ButtonAction::SendMessageToAllPrompt,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ButtonAction::ListTasks => "list_tasks",
            ButtonAction::AddTask => "add_task",
            ButtonAction::ListEvents => "list_events",
            ButtonAction::AddEvent => "add_event",
            ButtonAction::ListFiles => "list_files",
            ButtonAction::UploadFile => "upload_file",
            ButtonAction::SendMessageToAllPrompt => "send_message_to_all_prompt",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.token() == token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}
