//! Error types for conversation and message operations
//!
//! Every operation returns [`ChatResult`], so callers branch on the outcome
//! explicitly. [`ChatError::code`] maps each failure onto the stable
//! [`ErrorCode`] discriminant that travels over the wire.

use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A type alias for `Result<T, ChatError>`.
pub type ChatResult<T> = std::result::Result<T, ChatError>;

/// Errors that can occur in conversation and message operations
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed input, the caller should re-prompt
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No authenticated identity
    #[error("Not authenticated")]
    Unauthorized,

    /// Authenticated but not a participant, or not the sender of a
    /// sender-only action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// The edit window for the message has passed
    #[error("Edit window of {limit_seconds}s exceeded for message {message_id}")]
    TimeLimitExceeded {
        message_id: String,
        limit_seconds: i64,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level error discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    TimeLimitExceeded,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Only storage failures are worth re-issuing; everything else is a
    /// decision the server will make the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::InternalError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChatError::Validation(_) => ErrorCode::ValidationError,
            ChatError::Unauthorized => ErrorCode::Unauthorized,
            ChatError::Forbidden(_) => ErrorCode::Forbidden,
            ChatError::ConversationNotFound(_) | ChatError::MessageNotFound(_) => {
                ErrorCode::NotFound
            }
            ChatError::TimeLimitExceeded { .. } => ErrorCode::TimeLimitExceeded,
            ChatError::Storage(_) | ChatError::Serialization(_) | ChatError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        ChatError::Forbidden(msg.into())
    }

    /// SQLite reports writer contention as "database is locked" or busy.
    pub(crate) fn is_busy(&self) -> bool {
        match self {
            ChatError::Storage(e) => {
                let msg = e.to_string();
                msg.contains("database is locked") || msg.contains("SQLITE_BUSY")
            }
            _ => false,
        }
    }
}

/// Serializable error body returned to RPC callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ChatError> for ErrorBody {
    fn from(e: &ChatError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}
