//! CLI argument definitions for the Keel application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

use keel_core::types::Params;

/// Keel: a safety-checked action kernel for a local AI assistant.
#[derive(Parser, Debug)]
#[command(name = "keel", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the memory database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Route one action and print the result.
    Route {
        action: String,
        /// Parameters as a JSON object.
        params: Option<String>,
    },
    /// Route an action the user has already approved.
    Confirm {
        action: String,
        params: Option<String>,
    },
    /// Record model output as an assistant turn, then run its tool calls.
    Dispatch {
        /// Read from this file instead of stdin.
        file: Option<PathBuf>,
    },
    /// Print the tool calls found in model output without running them.
    Extract { file: Option<PathBuf> },
    /// Print the policy verdict for an action.
    Validate {
        action: String,
        params: Option<String>,
    },
    /// Print recent conversation entries.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Only entries of this role (user, assistant, system).
        #[arg(long)]
        role: Option<String>,
    },
    /// Read or write the context table.
    Context {
        #[command(subcommand)]
        op: ContextCommand,
    },
    /// Delete the conversation log.
    Clear {
        /// Also delete every context entry.
        #[arg(long)]
        context: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ContextCommand {
    Get { key: String },
    Set {
        key: String,
        /// Value as JSON; anything that does not parse is stored as a string.
        value: String,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > KEEL_CONFIG env var > platform default (~/.keel/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("KEEL_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Priority: --data-dir flag > config file value.
    /// Returns `None` if not overridden (use config default).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Parse an optional JSON object argument into action parameters.
pub fn parse_params(raw: Option<&str>) -> Result<Params, String> {
    let Some(raw) = raw else {
        return Ok(Params::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err("params must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid params JSON: {}", e)),
    }
}

/// Parse a context value: JSON if it parses, otherwise a plain string.
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Read model output from a file, or stdin when no file is given.
pub fn read_input(file: Option<&Path>) -> std::io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match keel_core::config::home_dir() {
        Some(home) => home.join(".keel").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
