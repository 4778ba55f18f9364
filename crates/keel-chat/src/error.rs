//! Error types for the conversational layer.

use keel_core::error::KeelError;

/// Errors from a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<KeelError> for ChatError {
    fn from(err: KeelError) -> Self {
        ChatError::Storage(err.to_string())
    }
}
