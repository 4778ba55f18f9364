//! Integration tests for the assistant turn loop over an on-disk store.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use keel_action::{ActionRegistry, Router};
use keel_chat::{Assistant, ChatError, ScriptedChatClient};
use keel_core::config::KeelConfig;
use keel_core::policy::PolicyEngine;
use keel_core::types::Role;
use keel_storage::{Database, MemoryStore};

fn build(path: &Path, client: Arc<ScriptedChatClient>, config: &KeelConfig) -> (Assistant, Arc<MemoryStore>) {
    let db = Arc::new(Database::new(path).unwrap());
    let store = Arc::new(MemoryStore::new(db, config.memory.max_history_items).unwrap());
    let registry =
        ActionRegistry::with_builtins(Arc::clone(&store), config.planning.max_steps).unwrap();
    let router = Arc::new(Router::new(
        registry,
        Arc::new(PolicyEngine::new(config.policy())),
    ));
    let assistant = Assistant::new(
        client,
        router,
        Arc::clone(&store),
        config.assistant.clone(),
        config.chat.clone(),
    );
    (assistant, store)
}

#[tokio::test]
async fn tool_calls_in_replies_are_executed_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("memory.db");
    let config = KeelConfig::default();

    let client = Arc::new(ScriptedChatClient::with_replies([
        r#"Nice to meet you! {"action": "memory_set_context", "params": {"key": "user_name", "value": "Ada"}}"#,
        r#"Here's the plan check: {"action": "plan_validate", "params": {"steps": ["Format the disk"]}} and {"action": "teleport_home"}"#,
    ]));
    let (assistant, store) = build(&db_path, Arc::clone(&client), &config);

    let first = assistant.process_message("Hi, I'm Ada").await.unwrap();
    assert_eq!(first.tool_calls.len(), 1);
    assert!(first.tool_results[0].success);
    assert_eq!(store.get_context("user_name").unwrap(), Some(json!("Ada")));

    let second = assistant.process_message("Can I wipe my disk?").await.unwrap();
    assert_eq!(second.tool_results.len(), 2);
    assert!(!second.tool_results[0].success);
    assert_eq!(second.tool_results[0].module.as_deref(), Some("planning"));
    assert!(!second.tool_results[1].success);
    assert_eq!(second.tool_results[1].module.as_deref(), Some("router"));

    // The second prompt carried the first exchange.
    let prompt = &client.prompts()[1];
    assert!(prompt.iter().any(|m| m.role == Role::Assistant && m.content.starts_with("Nice to meet you!")));

    drop(assistant);
    drop(store);

    // Everything survives a restart.
    let (_, reopened) = build(&db_path, Arc::new(ScriptedChatClient::new()), &config);
    let history = reopened.recall(10, None).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "Hi, I'm Ada");
    assert_eq!(history[3].role, Role::Assistant);
    assert_eq!(reopened.get_context("user_name").unwrap(), Some(json!("Ada")));
}

#[tokio::test]
async fn failed_model_call_leaves_only_the_user_turn() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedChatClient::new());
    client.push_error("connection refused");
    let (assistant, store) = build(&dir.path().join("m.db"), client, &KeelConfig::default());

    let err = assistant.process_message("hello?").await.unwrap_err();
    assert!(matches!(err, ChatError::Llm(ref m) if m == "connection refused"));
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn retention_applies_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = KeelConfig::default();
    config.memory.max_history_items = 4;

    let client = Arc::new(ScriptedChatClient::with_replies(["r1", "r2", "r3", "r4"]));
    let (assistant, store) = build(&dir.path().join("m.db"), client, &config);

    for i in 1..=4 {
        assistant.process_message(&format!("q{i}")).await.unwrap();
    }

    let contents: Vec<String> = store
        .recall(100, None)
        .unwrap()
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert_eq!(contents, vec!["q3", "r3", "q4", "r4"]);
}
