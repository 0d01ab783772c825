use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed payload: field count, date, or id.
    Validation,
    NotFound,
    /// The caller has no User record yet.
    Unregistered,
    Forbidden,
    /// One broadcast recipient could not be reached; never shown to the sender.
    Delivery,
    Internal,
}

/// Error carried back to the dispatcher. `message` is always safe to show to the caller.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct BotError {
    pub code: ErrorCode,
    pub message: String,
}

impl BotError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unregistered() -> Self {
        Self::new(ErrorCode::Unregistered, UNREGISTERED_MESSAGE)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Delivery, message)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal, INTERNAL_MESSAGE)
    }
}

pub const UNREGISTERED_MESSAGE: &str = "Please use /start to register first.";
pub const INTERNAL_MESSAGE: &str = "Something went wrong. Please try again later.";
