//! Memory action handler.
//!
//! Exposes the conversation log and context table to the model as
//! `memory_*` actions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use keel_core::types::{ActionResult, Params, Role};
use keel_storage::MemoryStore;

use crate::error::ActionError;
use crate::handler::{optional_str, required_str, ActionHandler};

/// Entries returned by `memory_recall` when no limit is given.
pub const DEFAULT_RECALL_LIMIT: usize = 10;

/// Handler for `memory_save`, `memory_recall`, `memory_get_context`,
/// `memory_set_context` and `memory_clear`.
pub struct MemoryHandler {
    store: Arc<MemoryStore>,
}

impl MemoryHandler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    fn save(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let content = required_str(params, "content", "Content is required")?;
        let role = match optional_str(params, "role") {
            Some(raw) => raw.parse::<Role>().map_err(ActionError::InvalidParams)?,
            None => Role::User,
        };
        let metadata = match params.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Params::new(),
        };

        let entry = self.store.append(role, content, metadata)?;
        Ok(ActionResult::ok(Params::new())
            .with_data("message", "Memory saved")
            .with_data("id", entry.id))
    }

    fn recall(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let limit = match params.get("limit") {
            None | Some(Value::Null) => DEFAULT_RECALL_LIMIT,
            Some(v) => v
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| {
                    ActionError::InvalidParams("limit must be a non-negative integer".to_string())
                })?,
        };
        let role = optional_str(params, "role")
            .map(|raw| raw.parse::<Role>().map_err(ActionError::InvalidParams))
            .transpose()?;

        let history = self.store.recall(limit, role)?;
        let count = history.len();
        let history = serde_json::to_value(&history).map_err(keel_core::KeelError::from)?;

        Ok(ActionResult::ok(Params::new())
            .with_data("history", history)
            .with_data("count", count))
    }

    fn get_context(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let key = required_str(params, "key", "Key is required")?;
        match self.store.get_context(key)? {
            Some(value) => Ok(ActionResult::ok(Params::new())
                .with_data("key", key)
                .with_data("value", value)),
            None => Ok(ActionResult::failure(format!("Context key '{}' not found", key))),
        }
    }

    fn set_context(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let key = required_str(params, "key", "Key is required")?;
        let value = params.get("value").cloned().unwrap_or(Value::Null);

        self.store.set_context(key, &value)?;
        Ok(ActionResult::ok(Params::new()).with_data("message", format!("Context '{}' saved", key)))
    }

    fn clear(&self, params: &Params) -> Result<ActionResult, ActionError> {
        let clear_context = params
            .get("clear_context")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        self.store.clear(clear_context)?;
        Ok(ActionResult::ok(Params::new())
            .with_data("message", "Memory cleared")
            .with_data("cleared", json!({ "history": true, "context": clear_context })))
    }
}

#[async_trait]
impl ActionHandler for MemoryHandler {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, action: &str, params: &Params) -> Result<ActionResult, ActionError> {
        match action {
            "memory_save" => self.save(params),
            "memory_recall" => self.recall(params),
            "memory_get_context" => self.get_context(params),
            "memory_set_context" => self.set_context(params),
            "memory_clear" => self.clear(params),
            _ => Ok(ActionResult::failure(format!(
                "Unknown memory action: {}",
                action
            ))),
        }
    }

    fn describe(&self, action: &str, params: &Params) -> String {
        match action {
            "memory_clear" => {
                if params.get("clear_context").and_then(|v| v.as_bool()) == Some(true) {
                    "Clear conversation history and context".to_string()
                } else {
                    "Clear conversation history".to_string()
                }
            }
            "memory_set_context" => format!(
                "Set context '{}'",
                optional_str(params, "key").unwrap_or("<no key>")
            ),
            _ => action.to_string(),
        }
    }
}
