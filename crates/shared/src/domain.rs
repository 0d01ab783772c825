use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(TaskId);
id_newtype!(EventId);
id_newtype!(FileId);
// Platform-side identifiers: the account that sent an update and the chat to reply into.
id_newtype!(AccountId);
id_newtype!(ChatId);

impl From<AccountId> for ChatId {
    /// Private chats share their id with the account on the platform side.
    fn from(value: AccountId) -> Self {
        ChatId(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_id: FileId,
    pub user_id: UserId,
    /// Opaque platform reference used to fetch the document again.
    pub file_ref: String,
    pub file_name: String,
}

/// The three owned resource kinds, used for wording and routing of the delete handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Task,
    Event,
    File,
}

impl ResourceKind {
    pub fn noun(self) -> &'static str {
        match self {
            ResourceKind::Task => "task",
            ResourceKind::Event => "event",
            ResourceKind::File => "file",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ResourceKind::Task => "Task",
            ResourceKind::Event => "Event",
            ResourceKind::File => "File",
        }
    }
}
