//! Keel application binary - composition root.
//!
//! Ties the Keel crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the memory database
//! 3. Build the handler registry, policy engine and router
//! 4. Run one subcommand and print its result as JSON on stdout
//!
//! Logs go to stderr so stdout stays machine-readable.

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use keel_action::{extract, ActionRegistry, Router};
use keel_chat::{Assistant, ScriptedChatClient};
use keel_core::config::KeelConfig;
use keel_core::policy::PolicyEngine;
use keel_core::types::Role;
use keel_storage::{Database, MemoryStore};

use cli::{CliArgs, Command, ContextCommand};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Long-lived kernel components, built once per process.
struct Kernel {
    store: Arc<MemoryStore>,
    router: Arc<Router>,
}

impl Kernel {
    fn build(config: &KeelConfig) -> AppResult<Self> {
        let db_path = config.memory_db_path();
        let db = Arc::new(Database::new(&db_path)?);
        let store = Arc::new(MemoryStore::new(db, config.memory.max_history_items)?);

        let registry =
            ActionRegistry::with_builtins(Arc::clone(&store), config.planning.max_steps)?;
        let policy = Arc::new(PolicyEngine::new(config.policy()));
        let router = Arc::new(Router::new(registry, policy));

        tracing::info!(
            db = %db_path.display(),
            prefixes = ?router.registry().prefixes(),
            "Kernel ready"
        );
        Ok(Self { store, router })
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load the config file without logging, so the caller can report the
/// outcome once tracing is up.
fn load_config(path: &Path) -> (KeelConfig, Option<String>) {
    if !path.exists() {
        return (KeelConfig::default(), None);
    }
    match KeelConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (KeelConfig::default(), Some(e.to_string())),
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let (mut config, load_error) = load_config(&config_file);

    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting Keel v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(
            "Failed to load config from {}: {}. Using defaults.",
            config_file.display(),
            e
        ),
        None => tracing::debug!("Config path: {}", config_file.display()),
    }

    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }

    run(args.command, &config).await
}

/// Run one subcommand. Only the arms that need storage open the database.
async fn run(command: Command, config: &KeelConfig) -> AppResult<()> {
    match command {
        Command::Extract { file } => {
            let text = cli::read_input(file.as_deref())?;
            print_json(&extract(&text))
        }
        Command::Validate { action, params } => {
            let params = cli::parse_params(params.as_deref())?;
            let verdict = PolicyEngine::new(config.policy()).validate(&action, &params);
            print_json(&verdict)
        }
        Command::Route { action, params } => {
            let params = cli::parse_params(params.as_deref())?;
            let kernel = Kernel::build(config)?;
            print_json(&kernel.router.route(&action, &params).await)
        }
        Command::Confirm { action, params } => {
            let params = cli::parse_params(params.as_deref())?;
            let kernel = Kernel::build(config)?;
            print_json(&kernel.router.route_confirmed(&action, &params).await)
        }
        Command::Dispatch { file } => {
            let text = cli::read_input(file.as_deref())?;
            let kernel = Kernel::build(config)?;
            // Replies arrive from outside; no model is called here.
            let assistant = Assistant::new(
                Arc::new(ScriptedChatClient::new()),
                Arc::clone(&kernel.router),
                Arc::clone(&kernel.store),
                config.assistant.clone(),
                config.chat.clone(),
            );
            let outcome = assistant.handle_reply(&text).await?;
            print_json(&outcome)
        }
        Command::History { limit, role } => {
            let role = role.map(|r| r.parse::<Role>()).transpose()?;
            let kernel = Kernel::build(config)?;
            print_json(&kernel.store.recall(limit, role)?)
        }
        Command::Context { op } => {
            let kernel = Kernel::build(config)?;
            match op {
                ContextCommand::Get { key } => print_json(&kernel.store.get_context_entry(&key)?),
                ContextCommand::Set { key, value } => {
                    kernel.store.set_context(&key, &cli::parse_value(&value))?;
                    print_json(&kernel.store.get_context_entry(&key)?)
                }
            }
        }
        Command::Clear { context } => {
            let kernel = Kernel::build(config)?;
            kernel.store.clear(context)?;
            print_json(&serde_json::json!({
                "cleared": true,
                "context_cleared": context,
            }))
        }
    }
}
