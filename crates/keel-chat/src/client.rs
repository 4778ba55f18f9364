//! Chat-completion client abstraction.
//!
//! The assistant only needs "messages in, reply text out". Transport,
//! model hosting and streaming live behind [`ChatClient`]; a failed call is
//! always the `Err` arm, never a reply string.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use keel_core::config::ChatConfig;
use keel_core::types::Role;

use crate::error::ChatError;

/// One message of the prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Sampling options passed through to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
}

impl From<&ChatConfig> for ChatOptions {
    fn from(config: &ChatConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

/// Turns an ordered message list into an assistant reply.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, ChatError>;
}

// =============================================================================
// Scripted implementation
// =============================================================================

/// Client that replays canned replies in order.
///
/// Used for tests and offline runs. Every prompt it receives is recorded so
/// callers can inspect what the model would have seen. Once the script is
/// exhausted each call fails with `ChatError::Llm`.
#[derive(Debug, Default)]
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that answers with each of `replies` in turn.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    /// Queue a failure: the next call returns `ChatError::Llm(message)`.
    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.replies).push_back(Err(message.into()));
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.prompts).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, ChatError> {
        lock(&self.prompts).push(messages.to_vec());
        tracing::debug!(
            model = %options.model,
            messages = messages.len(),
            "Scripted chat call"
        );

        match lock(&self.replies).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ChatError::Llm(message)),
            None => Err(ChatError::Llm("no scripted reply left".to_string())),
        }
    }
}
