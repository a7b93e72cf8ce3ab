use gigi_chat::{ChatError, ErrorCode};
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The service rejected the call
    #[error(transparent)]
    Server(#[from] ChatError),

    #[error("Message not in view: {0}")]
    UnknownMessage(String),

    /// Provisional messages cannot be edited or deleted until they settle
    #[error("Message {0} has not been sent yet")]
    NotSent(String),

    #[error("No failed send to retry for {0}")]
    NothingToRetry(String),

    /// The local pre-check says the edit window has closed
    #[error("Edit window closed for message {0}")]
    EditWindowClosed(String),

    #[error("Only the sender can edit message {0}")]
    NotSender(String),
}

impl ClientError {
    /// Wire code for server failures; local refusals map onto the code the
    /// server would have answered with
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Server(e) => e.code(),
            ClientError::UnknownMessage(_) => ErrorCode::NotFound,
            ClientError::NotSent(_) | ClientError::NothingToRetry(_) => {
                ErrorCode::ValidationError
            }
            ClientError::EditWindowClosed(_) => ErrorCode::TimeLimitExceeded,
            ClientError::NotSender(_) => ErrorCode::Forbidden,
        }
    }
}
