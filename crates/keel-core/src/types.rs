use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action parameters: an ordered JSON object.
pub type Params = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Enums
// =============================================================================

/// Speaker of a conversation entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

// =============================================================================
// Action request / result
// =============================================================================

/// A named action with parameters, as produced by the extractor or
/// supplied directly by a caller.
///
/// The wire form uses `action` for the name, matching what the model is
/// prompted to emit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "action", default)]
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Normalized outcome of routing one action.
///
/// A confirmation-pending result always has `success == false` and
/// `requires_confirmation == true`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Params,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ActionResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Params) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    /// A failed result with the given error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A pending-confirmation signal echoing the original params back.
    pub fn confirmation_required(action: &str, params: &Params) -> Self {
        let mut data = Params::new();
        data.insert(
            "message".to_string(),
            serde_json::Value::String(format!("Please confirm: {}", action)),
        );
        data.insert(
            "params".to_string(),
            serde_json::Value::Object(params.clone()),
        );
        Self {
            success: false,
            requires_confirmation: true,
            data,
            ..Self::default()
        }
    }

    /// Insert one field into `data`.
    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Stamp the owning module and action name.
    pub fn stamped(mut self, module: &str, action: &str) -> Self {
        self.module = Some(module.to_string());
        self.action = Some(action.to_string());
        self
    }

    /// The suggestion attached to a denial, if any.
    pub fn suggestion(&self) -> Option<&str> {
        self.data.get("suggestion").and_then(|v| v.as_str())
    }
}

/// The policy engine's allow/deny decision for one invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyVerdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Memory entities
// =============================================================================

/// One append-only entry of the conversation log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Params,
}

/// One row of the key/value context table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_display_and_parse() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn test_action_request_wire_form() {
        let req: ActionRequest =
            serde_json::from_value(json!({"action": "file_read", "params": {"path": "/tmp/a"}}))
                .unwrap();
        assert_eq!(req.name, "file_read");
        assert_eq!(req.params["path"], "/tmp/a");

        let bare: ActionRequest = serde_json::from_value(json!({"params": {}})).unwrap();
        assert!(bare.name.is_empty());
    }

    #[test]
    fn test_confirmation_result_echoes_params() {
        let mut params = Params::new();
        params.insert("path".into(), json!("/tmp/x"));
        let result = ActionResult::confirmation_required("file_delete", &params);
        assert!(!result.success);
        assert!(result.requires_confirmation);
        assert_eq!(result.data["params"], json!({"path": "/tmp/x"}));
        assert_eq!(result.data["message"], "Please confirm: file_delete");
    }

    #[test]
    fn test_result_serialization_skips_absent_fields() {
        let value = serde_json::to_value(ActionResult::ok(Params::new())).unwrap();
        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
        assert!(value.get("module").is_none());

        let stamped = ActionResult::failure("boom").stamped("memory", "memory_save");
        let value = serde_json::to_value(stamped).unwrap();
        assert_eq!(value["error"], "boom");
        assert_eq!(value["module"], "memory");
        assert_eq!(value["action"], "memory_save");
    }

    #[test]
    fn test_suggestion_accessor() {
        let result = ActionResult::failure("denied").with_data("suggestion", "do it by hand");
        assert_eq!(result.suggestion(), Some("do it by hand"));
        assert_eq!(ActionResult::failure("x").suggestion(), None);
    }
}
