//! Error types for the action kernel.

use keel_core::error::KeelError;
use keel_core::types::ActionResult;

/// Errors from routing and handler execution.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Policy denied: {reason}")]
    PolicyDenied { action: String, reason: String },
    #[error("Unknown action: {action}")]
    UnknownAction { action: String, prefixes: Vec<String> },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Action handler failed: {0}")]
    HandlerFailed(String),
    #[error("Prefix '{prefix}' conflicts with registered prefix '{existing}'")]
    AmbiguousPrefix { prefix: String, existing: String },
    #[error("Storage error: {0}")]
    Storage(#[from] KeelError),
}

/// Render registered prefixes the way users type them: `memory_*, plan_*`.
pub fn prefix_listing(prefixes: &[String]) -> String {
    prefixes
        .iter()
        .map(|p| format!("{}*", p))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<&ActionError> for ActionResult {
    fn from(err: &ActionError) -> Self {
        match err {
            ActionError::PolicyDenied { action, reason } => ActionResult::failure(reason.clone())
                .with_data("suggestion", keel_core::suggest_alternative(action, reason)),
            ActionError::UnknownAction { action, prefixes } => {
                let available = format!("Available action types: {}", prefix_listing(prefixes));
                ActionResult::failure(format!("Unknown action: {}. {}", action, available))
                    .with_data("suggestion", available)
            }
            ActionError::InvalidParams(msg) => ActionResult::failure(msg.clone()),
            ActionError::HandlerFailed(msg) => {
                ActionResult::failure(format!("Module execution failed: {}", msg))
            }
            other => ActionResult::failure(other.to_string()),
        }
    }
}

impl From<ActionError> for ActionResult {
    fn from(err: ActionError) -> Self {
        ActionResult::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::HandlerFailed("connection reset".to_string());
        assert_eq!(err.to_string(), "Action handler failed: connection reset");

        let err = ActionError::InvalidParams("Content is required".to_string());
        assert_eq!(err.to_string(), "Invalid parameters: Content is required");

        let err = ActionError::AmbiguousPrefix {
            prefix: "mem".to_string(),
            existing: "memory_".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Prefix 'mem' conflicts with registered prefix 'memory_'"
        );
    }

    #[test]
    fn test_action_error_from_keel_error() {
        let storage_err = KeelError::Storage("disk full".to_string());
        let action_err: ActionError = storage_err.into();
        assert!(matches!(action_err, ActionError::Storage(_)));
        assert!(action_err.to_string().contains("disk full"));
    }

    #[test]
    fn test_prefix_listing() {
        let prefixes = vec!["memory_".to_string(), "plan_".to_string()];
        assert_eq!(prefix_listing(&prefixes), "memory_*, plan_*");
        assert_eq!(prefix_listing(&[]), "");
    }

    #[test]
    fn test_unknown_action_result_enumerates_prefixes() {
        let err = ActionError::UnknownAction {
            action: "teleport_now".to_string(),
            prefixes: vec!["file_".to_string(), "memory_".to_string()],
        };
        let result = ActionResult::from(&err);
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Unknown action: teleport_now. Available action types: file_*, memory_*")
        );
        assert_eq!(
            result.suggestion(),
            Some("Available action types: file_*, memory_*")
        );
    }

    #[test]
    fn test_denial_result_carries_suggestion() {
        let err = ActionError::PolicyDenied {
            action: "format_drive".to_string(),
            reason: "Action 'format_drive' is blocked for safety reasons".to_string(),
        };
        let result: ActionResult = err.into();
        assert!(!result.success);
        assert!(!result.requires_confirmation);
        assert_eq!(
            result.error.as_deref(),
            Some("Action 'format_drive' is blocked for safety reasons")
        );
        assert_eq!(
            result.suggestion(),
            Some(keel_core::suggest_alternative("format_drive", "blocked").as_str())
        );
        assert!(result.suggestion().unwrap().starts_with("Formatting drives is not supported"));
    }

    #[test]
    fn test_handler_failure_result_message() {
        let result: ActionResult = ActionError::HandlerFailed("boom".to_string()).into();
        assert_eq!(result.error.as_deref(), Some("Module execution failed: boom"));
    }
}
