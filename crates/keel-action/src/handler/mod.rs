//! Action handler registry and trait definition.
//!
//! Defines the `ActionHandler` async trait and the prefix registry the
//! router uses to find the handler that owns an action name.

pub mod memory;
pub mod planning;

use std::sync::Arc;

use async_trait::async_trait;

use keel_core::types::{ActionResult, Params};

use crate::error::ActionError;

pub use memory::MemoryHandler;
pub use planning::PlanningHandler;

/// A family of actions sharing one name prefix.
///
/// A handler reports failure either by returning a result with
/// `success == false` or by returning `Err`; the router accepts both.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Module name stamped on every result this handler produces.
    fn name(&self) -> &str;

    async fn execute(&self, action: &str, params: &Params) -> Result<ActionResult, ActionError>;

    /// One-line description used in confirmation prompts.
    fn describe(&self, action: &str, params: &Params) -> String {
        if params.is_empty() {
            action.to_string()
        } else {
            format!("{} {}", action, serde_json::Value::Object(params.clone()))
        }
    }
}

/// Ordered list of (prefix, handler) pairs.
///
/// No registered prefix is a prefix of another, so at most one entry can
/// match any action name.
#[derive(Default)]
pub struct ActionRegistry {
    entries: Vec<(String, Arc<dyn ActionHandler>)>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `memory_` and `plan_` handlers.
    pub fn with_builtins(
        store: Arc<keel_storage::MemoryStore>,
        max_plan_steps: usize,
    ) -> Result<Self, ActionError> {
        let mut registry = Self::new();
        registry.register("memory_", Arc::new(MemoryHandler::new(store)))?;
        registry.register("plan_", Arc::new(PlanningHandler::new(max_plan_steps)))?;
        Ok(registry)
    }

    /// Register `handler` for every action starting with `prefix`.
    pub fn register(
        &mut self,
        prefix: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), ActionError> {
        if prefix.is_empty() {
            return Err(ActionError::InvalidParams(
                "Handler prefix must not be empty".to_string(),
            ));
        }
        if let Some((existing, _)) = self
            .entries
            .iter()
            .find(|(existing, _)| existing.starts_with(prefix) || prefix.starts_with(existing.as_str()))
        {
            return Err(ActionError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                existing: existing.clone(),
            });
        }

        tracing::debug!(prefix, module = handler.name(), "Handler registered");
        self.entries.push((prefix.to_string(), handler));
        Ok(())
    }

    /// The handler owning `action`, if any.
    pub fn resolve(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.entries
            .iter()
            .find(|(prefix, _)| action.starts_with(prefix.as_str()))
            .map(|(_, handler)| Arc::clone(handler))
    }

    /// Registered prefixes in registration order.
    pub fn prefixes(&self) -> Vec<String> {
        self.entries.iter().map(|(prefix, _)| prefix.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Parameter helpers shared by the built-in handlers
// =============================================================================

/// A non-empty string parameter, or `InvalidParams(missing)`.
pub(crate) fn required_str<'a>(
    params: &'a Params,
    key: &str,
    missing: &str,
) -> Result<&'a str, ActionError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::InvalidParams(missing.to_string()))
}

pub(crate) fn optional_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
