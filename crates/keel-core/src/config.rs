use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{KeelError, Result};

/// Top-level configuration for Keel.
///
/// Loaded from `~/.keel/config.toml` by default. Each section corresponds
/// to a component of the kernel or a cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeelConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub file_actions: FileActionsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
}

impl KeelConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KeelConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KeelError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// The read-only slice of configuration consumed by the policy engine.
    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            safety: self.safety.clone(),
            file_actions: self.file_actions.clone(),
            email: self.email.clone(),
        }
    }

    /// Absolute path of the memory database file.
    pub fn memory_db_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.memory.storage_file)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the memory database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.keel/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Assistant persona used to render the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
    pub personality: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Keel".to_string(),
            personality: "helpful, careful, and safe".to_string(),
        }
    }
}

/// Chat-completion settings passed through to the model client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature (0.0 to 1.0).
    pub temperature: f32,
    /// Number of recent conversation entries replayed to the model.
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
            temperature: 0.7,
            history_window: 5,
        }
    }
}

/// Action-level safety policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Actions that are always denied.
    pub blocked_actions: Vec<String>,
    /// Actions that must be approved by the user before they run.
    pub require_confirmation_for: Vec<String>,
    /// Case-insensitive regexes that mark a system command as dangerous.
    pub dangerous_command_patterns: Vec<String>,
}

impl SafetyConfig {
    pub fn is_blocked(&self, action: &str) -> bool {
        self.blocked_actions.iter().any(|a| a == action)
    }

    pub fn requires_confirmation(&self, action: &str) -> bool {
        self.require_confirmation_for.iter().any(|a| a == action)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            blocked_actions: vec!["format_drive".to_string(), "modify_registry".to_string()],
            require_confirmation_for: vec![
                "file_delete".to_string(),
                "file_move".to_string(),
                "email_send".to_string(),
            ],
            dangerous_command_patterns: vec![
                r"\brm\s+-rf".to_string(),
                r"\bformat\b".to_string(),
                r"\bdel\s+/[fqs]".to_string(),
                r"\brd\s+/s".to_string(),
                r">\s*\\?/dev/".to_string(),
                r"\bregedit\b".to_string(),
                r"\breg\s+(delete|add)".to_string(),
            ],
        }
    }
}

/// File action constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileActionsConfig {
    /// Directories that may never be touched (the directory itself included).
    pub forbidden_directories: Vec<String>,
    /// When non-empty, file actions are confined to these directories.
    /// Relative entries are taken relative to the user's home directory.
    pub safe_directories: Vec<String>,
    /// Maximum size of a file that may be read or overwritten, in megabytes.
    pub max_file_size_mb: f64,
}

impl Default for FileActionsConfig {
    fn default() -> Self {
        Self {
            forbidden_directories: default_forbidden_directories(),
            safe_directories: Vec::new(),
            max_file_size_mb: 100.0,
        }
    }
}

#[cfg(target_os = "windows")]
fn default_forbidden_directories() -> Vec<String> {
    ["C:\\Windows", "C:\\Program Files", "C:\\Program Files (x86)"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(not(target_os = "windows"))]
fn default_forbidden_directories() -> Vec<String> {
    ["/etc", "/boot", "/sys", "/proc", "/dev", "/bin", "/sbin", "/usr/bin", "/usr/sbin"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Email capability switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Database file name inside the data directory.
    pub storage_file: String,
    /// Retention cap for the conversation log.
    pub max_history_items: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_file: "keel_memory.db".to_string(),
            max_history_items: 1000,
        }
    }
}

/// Plan validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub max_steps: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self { max_steps: 10 }
    }
}

/// Configuration view consumed by the policy engine.
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub safety: SafetyConfig,
    pub file_actions: FileActionsConfig,
    pub email: EmailConfig,
}

/// The current user's home directory, from `HOME` (or `USERPROFILE` on Windows).
pub fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "USERPROFILE";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var_os(var).map(PathBuf::from)
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
