//! Policy engine for action validation.
//!
//! Decides whether an action may run before the router dispatches it.
//! Rules are evaluated in order and the first failing rule wins: the
//! block-list, then a category check chosen by action-name prefix
//! (file, email, system command). Anything not covered is allowed.
//!
//! Verdicts are computed fresh on every call and never cached.

use std::path::{Component, Path, PathBuf};

use regex::RegexBuilder;
use serde_json::Value;
use tracing::debug;

use crate::config::{expand_home, home_dir, PolicyConfig};
use crate::types::{Params, PolicyVerdict};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Policy engine bound to one configuration snapshot.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    /// Create a new policy engine with the given configuration.
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Validate an action against this engine's configuration.
    pub fn validate(&self, action: &str, params: &Params) -> PolicyVerdict {
        validate(action, params, &self.config)
    }

    /// Whether the action must be approved by the user before it runs.
    pub fn requires_confirmation(&self, action: &str) -> bool {
        self.config.safety.requires_confirmation(action)
    }
}

/// Validate an action. Pure apart from read-only filesystem lookups.
pub fn validate(action: &str, params: &Params, config: &PolicyConfig) -> PolicyVerdict {
    if config.safety.is_blocked(action) {
        return PolicyVerdict::deny(format!(
            "Action '{}' is blocked for safety reasons",
            action
        ));
    }

    let verdict = if action.starts_with("file_") {
        validate_file_action(action, params, config)
    } else if action.starts_with("email_") {
        validate_email_action(action, params, config)
    } else if action.starts_with("system_") {
        validate_system_command(params, config)
    } else {
        PolicyVerdict::allow("Action is safe")
    };

    debug!(action, allowed = verdict.allowed, reason = %verdict.reason, "Policy verdict");
    verdict
}

fn validate_file_action(action: &str, params: &Params, config: &PolicyConfig) -> PolicyVerdict {
    let raw = params.get("path").and_then(Value::as_str).unwrap_or("");
    if raw.is_empty() {
        return PolicyVerdict::deny("File path is required");
    }

    let target = resolve_path(&expand_home(raw));
    let settings = &config.file_actions;

    for forbidden in &settings.forbidden_directories {
        let dir = resolve_path(&expand_home(forbidden));
        if is_within(&target, &dir) {
            return PolicyVerdict::deny(format!(
                "Access to '{}' directory is forbidden",
                forbidden
            ));
        }
    }

    if !settings.safe_directories.is_empty() {
        let inside_safe = settings
            .safe_directories
            .iter()
            .any(|safe| is_within(&target, &resolve_path(&safe_dir_path(safe))));
        if !inside_safe {
            return PolicyVerdict::deny(format!(
                "File access is only allowed in safe directories: {}",
                settings.safe_directories.join(", ")
            ));
        }
    }

    if matches!(action, "file_read" | "file_write") {
        if let Ok(meta) = std::fs::metadata(&target) {
            if meta.is_file() {
                let size_mb = meta.len() as f64 / BYTES_PER_MB;
                if size_mb > settings.max_file_size_mb {
                    return PolicyVerdict::deny(format!(
                        "File size ({:.1}MB) exceeds maximum allowed size ({}MB)",
                        size_mb, settings.max_file_size_mb
                    ));
                }
            }
        }
    }

    PolicyVerdict::allow("File action is safe")
}

fn validate_email_action(action: &str, params: &Params, config: &PolicyConfig) -> PolicyVerdict {
    if !config.email.enabled {
        return PolicyVerdict::deny("Email module is disabled");
    }

    if action == "email_send" {
        if !is_truthy(params.get("recipient")) {
            return PolicyVerdict::deny("Recipient email is required");
        }
        if !is_truthy(params.get("subject")) && !is_truthy(params.get("body")) {
            return PolicyVerdict::deny("Email must have subject or body");
        }
    }

    PolicyVerdict::allow("Email action is safe")
}

fn validate_system_command(params: &Params, config: &PolicyConfig) -> PolicyVerdict {
    let command = params.get("command").and_then(Value::as_str).unwrap_or("");
    if command.is_empty() {
        return PolicyVerdict::deny("Command is required");
    }

    for pattern in &config.safety.dangerous_command_patterns {
        if command_matches(command, pattern) {
            return PolicyVerdict::deny(format!(
                "Command contains potentially dangerous operation: {}",
                pattern
            ));
        }
    }

    PolicyVerdict::allow("System command is safe")
}

/// Case-insensitive regex match. A pattern that does not compile is
/// matched as a literal substring instead.
fn command_matches(command: &str, pattern: &str) -> bool {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(command),
        Err(_) => command.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

/// Absent, null, false, zero, and empty values are all "missing".
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Safe directories without a root are relative to the home directory.
fn safe_dir_path(entry: &str) -> PathBuf {
    let expanded = expand_home(entry);
    if expanded.is_absolute() {
        return expanded;
    }
    match home_dir() {
        Some(home) => home.join(expanded),
        None => expanded,
    }
}

/// Resolve a path to an absolute, symlink-resolved form.
///
/// Components are resolved one at a time: every prefix that exists is
/// canonicalized, so a `..` after a symlink climbs out of the link target.
/// Once a component does not exist the remainder is applied lexically.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                resolved = std::fs::canonicalize(&candidate).unwrap_or(candidate);
            }
        }
    }
    resolved
}

/// Component-wise containment: `target` equals `dir` or descends from it.
///
/// Windows and macOS file systems are case-insensitive by default, so the
/// comparison folds case there.
pub fn is_within(target: &Path, dir: &Path) -> bool {
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        fold_case(target).starts_with(fold_case(dir))
    } else {
        target.starts_with(dir)
    }
}

fn fold_case(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

/// Suggest a safer alternative for a denied action.
pub fn suggest_alternative(action: &str, reason: &str) -> String {
    let known = match action {
        "file_delete" => Some(
            "Instead of deleting, consider moving the file to a safe location or creating a backup first.",
        ),
        "format_drive" => Some(
            "Formatting drives is not supported. Please use your operating system's disk management tools for such operations.",
        ),
        "modify_registry" => Some(
            "Registry modifications are not supported for safety. Please use Registry Editor manually if needed.",
        ),
        "system_command" => Some(
            "This command appears unsafe. Please run it manually if you're certain it's safe.",
        ),
        _ => None,
    };
    if let Some(text) = known {
        return text.to_string();
    }

    if reason.contains("exceeds maximum allowed size") {
        return "Work with a smaller file, or split it into parts before processing.".to_string();
    }
    if reason.contains("only allowed in safe directories") {
        return "Move the file into one of the configured safe directories first.".to_string();
    }

    "This action cannot be performed automatically. Please consider doing it manually with appropriate caution.".to_string()
}
