//! Assistant turn loop.
//!
//! One turn: record the user's message, rebuild the model's context from
//! recent history, ask the model, record its reply, then extract and route
//! any tool calls in that reply. Actions that need the user's approval are
//! parked on the confirmation gate and can be run later with
//! [`Assistant::confirm`].

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use keel_action::{ConfirmationGate, JsonBlockExtractor, Router, ToolCallExtractor};
use keel_core::config::{AssistantConfig, ChatConfig};
use keel_core::types::{ActionRequest, ActionResult, Params, Role};
use keel_storage::MemoryStore;

use crate::client::{ChatClient, ChatMessage, ChatOptions};
use crate::error::ChatError;

/// Everything one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// The model's reply text, verbatim.
    pub response: String,
    pub tool_calls: Vec<ActionRequest>,
    /// One result per tool call, in the same order.
    pub tool_results: Vec<ActionResult>,
}

impl TurnOutcome {
    /// Ids of confirmations this turn queued.
    pub fn pending_confirmations(&self) -> Vec<Uuid> {
        self.tool_results
            .iter()
            .filter_map(|r| r.data.get("confirmation_id"))
            .filter_map(|v| v.as_str())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

/// Conversational front end over the action kernel.
pub struct Assistant {
    client: Arc<dyn ChatClient>,
    router: Arc<Router>,
    store: Arc<MemoryStore>,
    gate: Arc<ConfirmationGate>,
    extractor: Box<dyn ToolCallExtractor>,
    persona: AssistantConfig,
    chat: ChatConfig,
}

impl Assistant {
    pub fn new(
        client: Arc<dyn ChatClient>,
        router: Arc<Router>,
        store: Arc<MemoryStore>,
        persona: AssistantConfig,
        chat: ChatConfig,
    ) -> Self {
        Self {
            client,
            router,
            store,
            gate: Arc::new(ConfirmationGate::new()),
            extractor: Box::new(JsonBlockExtractor),
            persona,
            chat,
        }
    }

    /// Replace the default extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn ToolCallExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Share a confirmation gate with other front ends.
    pub fn with_gate(mut self, gate: Arc<ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    /// System prompt: persona plus the tool-call format the extractor expects.
    pub fn system_prompt(&self) -> String {
        let prefixes = keel_action::error::prefix_listing(&self.router.registry().prefixes());
        format!(
            r#"You are {name}, a {personality} AI assistant.

You help users with various tasks while prioritizing safety and user well-being.

Available action types: {prefixes}

When suggesting actions, provide them as JSON tool calls in this format:
{{
    "action": "action_name",
    "params": {{
        "param1": "value1",
        "param2": "value2"
    }}
}}

Safety Guidelines:
- Never suggest destructive operations without user confirmation
- Avoid accessing system directories or sensitive files
- Always validate paths and inputs
- If unsure about safety, ask the user
- Suggest safe alternatives for risky operations

Be conversational, friendly, and helpful. If you cannot perform a task, explain why and suggest alternatives."#,
            name = self.persona.name,
            personality = self.persona.personality,
            prefixes = prefixes,
        )
    }

    /// Run one full turn for a user message.
    ///
    /// If the model call fails the user's message stays recorded but no
    /// assistant entry is written and no actions run.
    pub async fn process_message(&self, text: &str) -> Result<TurnOutcome, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let user_entry = self.store.append(Role::User, text, Params::new())?;

        let prior: Vec<_> = self
            .store
            .recall(self.chat.history_window + 1, None)?
            .into_iter()
            .filter(|entry| entry.id != user_entry.id)
            .collect();
        let skip = prior.len().saturating_sub(self.chat.history_window);

        let mut messages = Vec::with_capacity(prior.len() - skip + 2);
        messages.push(ChatMessage::system(self.system_prompt()));
        messages.extend(
            prior
                .into_iter()
                .skip(skip)
                .map(|entry| ChatMessage::new(entry.role, entry.content)),
        );
        messages.push(ChatMessage::user(text));

        let options = ChatOptions::from(&self.chat);
        let reply = match self.client.chat(&messages, &options).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "Chat completion failed");
                return Err(err);
            }
        };

        self.handle_reply(&reply).await
    }

    /// The post-model half of a turn: record, extract, route.
    pub async fn handle_reply(&self, reply: &str) -> Result<TurnOutcome, ChatError> {
        if !reply.is_empty() {
            self.store.append(Role::Assistant, reply, Params::new())?;
        }

        let tool_calls = self.extractor.extract(reply);
        let mut tool_results = self.router.process_batch(&tool_calls).await;

        for (request, result) in tool_calls.iter().zip(tool_results.iter_mut()) {
            if result.requires_confirmation {
                let description = result
                    .data
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or(request.name.as_str())
                    .to_string();
                let id = self
                    .gate
                    .request(&request.name, request.params.clone(), description);
                result
                    .data
                    .insert("confirmation_id".to_string(), id.to_string().into());
            }
        }

        tracing::info!(
            calls = tool_calls.len(),
            failed = tool_results.iter().filter(|r| !r.success).count(),
            "Turn completed"
        );

        Ok(TurnOutcome {
            response: reply.to_string(),
            tool_calls,
            tool_results,
        })
    }

    /// Run a parked action after the user approved it.
    pub async fn confirm(&self, id: Uuid) -> Option<ActionResult> {
        self.router.approve(&self.gate, id).await
    }

    /// Drop a parked action. Returns `false` if it was not pending.
    pub fn dismiss(&self, id: Uuid) -> bool {
        self.gate.dismiss(id)
    }
}
