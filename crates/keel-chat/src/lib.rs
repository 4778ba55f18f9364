//! Conversational layer for Keel.
//!
//! Wraps the action kernel in a chat turn loop: history from the memory
//! store goes to a [`ChatClient`], and tool calls in the reply are routed.

pub mod assistant;
pub mod client;
pub mod error;

pub use assistant::{Assistant, TurnOutcome};
pub use client::{ChatClient, ChatMessage, ChatOptions, ScriptedChatClient};
pub use error::ChatError;
