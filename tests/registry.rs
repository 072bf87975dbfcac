// tests/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use channel_layer::{BackendRegistry, ChannelConfig, Error, Message};

fn msg(value: serde_json::Value) -> Message {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("test message must be a JSON object, got {other}"),
    }
}

fn registry() -> BackendRegistry {
    let mut configs = HashMap::new();
    configs.insert("default".to_string(), ChannelConfig::memory());
    configs.insert(
        "short-lived".to_string(),
        ChannelConfig::memory().with_expiry_secs(1),
    );
    BackendRegistry::new(configs)
}

#[tokio::test]
async fn same_alias_yields_the_same_instance() {
    // ---
    let registry = registry();

    let first = registry.get("default").await.unwrap();
    let second = registry.get("default").await.unwrap();

    // Cached: both handles share one backend, so they share queues.
    assert!(Arc::ptr_eq(&first, &second));

    first.send("orders", msg(json!({"id": 1}))).await.unwrap();
    let received = second
        .receive_many(&["orders".to_string()])
        .await
        .unwrap();
    assert!(received.is_some());
}

#[tokio::test]
async fn distinct_aliases_yield_distinct_instances() {
    // ---
    let registry = registry();

    let default = registry.get("default").await.unwrap();
    let short = registry.get("short-lived").await.unwrap();

    assert!(!Arc::ptr_eq(&default, &short));
}

#[tokio::test]
async fn unknown_alias_is_a_configuration_error() {
    // ---
    let registry = registry();

    let result = registry.get("nope").await;
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn aliases_lists_configured_names() {
    // ---
    let registry = registry();

    let mut aliases: Vec<&str> = registry.aliases().collect();
    aliases.sort_unstable();
    assert_eq!(aliases, vec!["default", "short-lived"]);
}
