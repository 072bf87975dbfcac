// tests/backend_memory.rs

use serde_json::json;
use tokio::time::{timeout, Duration};

use channel_layer::{
    // ---
    create_backend,
    BackendPtr,
    ChannelConfig,
    Error,
    Message,
};

fn msg(value: serde_json::Value) -> Message {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("test message must be a JSON object, got {other}"),
    }
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

async fn memory_backend() -> BackendPtr {
    create_backend(&ChannelConfig::memory())
        .await
        .expect("failed to create memory backend")
}

#[tokio::test]
async fn fifo_within_a_channel() {
    // ---
    let backend = memory_backend().await;

    backend.send("orders", msg(json!({"seq": 1}))).await.unwrap();
    backend.send("orders", msg(json!({"seq": 2}))).await.unwrap();

    let (channel, first) = backend
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .expect("first message available");
    assert_eq!(channel, "orders");
    assert_eq!(first["seq"], json!(1));

    let (_, second) = backend
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .expect("second message available");
    assert_eq!(second["seq"], json!(2));
}

#[tokio::test]
async fn multi_channel_fan_in() {
    // ---
    let backend = memory_backend().await;

    backend.send("alpha", msg(json!({"from": "alpha"}))).await.unwrap();
    backend.send("beta", msg(json!({"from": "beta"}))).await.unwrap();

    let (first_channel, first) = backend
        .receive_many(&names(&["alpha", "beta"]))
        .await
        .unwrap()
        .expect("a message from either channel");
    assert_eq!(first["from"], json!(first_channel.as_str()));

    // Drain the remaining channel on its own.
    let remaining = if first_channel == "alpha" { "beta" } else { "alpha" };
    let (second_channel, second) = backend
        .receive_many(&names(&[remaining]))
        .await
        .unwrap()
        .expect("remaining channel still has its message");
    assert_eq!(second_channel, remaining);
    assert_eq!(second["from"], json!(remaining));

    assert!(backend
        .receive_many(&names(&["alpha", "beta"]))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn expired_messages_are_never_delivered() {
    // ---
    let backend = create_backend(&ChannelConfig::memory().with_expiry_secs(-60))
        .await
        .unwrap();

    backend.send("orders", msg(json!({"id": 1}))).await.unwrap();

    assert!(backend
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn receive_with_no_channels_is_invalid() {
    // ---
    let backend = memory_backend().await;

    let result = backend.receive_many(&[]).await;
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn group_add_and_discard() {
    // ---
    let backend = memory_backend().await;

    backend.group_add("g", "a", None).await.unwrap();
    backend.group_add("g", "b", None).await.unwrap();
    backend.group_discard("g", "b").await.unwrap();

    // Discarding an absent member is a no-op.
    backend.group_discard("g", "missing").await.unwrap();
    backend.group_discard("no-such-group", "a").await.unwrap();

    let members = backend.group_channels("g").await.unwrap();
    assert_eq!(members.into_iter().collect::<Vec<_>>(), vec!["a"]);
}

#[tokio::test]
async fn group_readd_refreshes_membership() {
    // ---
    let backend = memory_backend().await;

    backend.group_add("g", "a", Some(-5)).await.unwrap();
    assert!(backend.group_channels("g").await.unwrap().is_empty());

    backend.group_add("g", "a", Some(60)).await.unwrap();
    assert!(backend.group_channels("g").await.unwrap().contains("a"));
}

#[tokio::test]
async fn send_group_fans_out_to_all_members() {
    // ---
    let backend = memory_backend().await;

    backend.group_add("g", "x", None).await.unwrap();
    backend.group_add("g", "y", None).await.unwrap();

    backend
        .send_group("g", &msg(json!({"event": "ping"})))
        .await
        .unwrap();

    for channel in ["x", "y"] {
        let (got_channel, got) = backend
            .receive_many(&names(&[channel]))
            .await
            .unwrap()
            .expect("fan-out delivered to every member");
        assert_eq!(got_channel, channel);
        assert_eq!(got["event"], json!("ping"));
    }
}

#[tokio::test]
async fn expired_group_members_are_invisible() {
    // ---
    let backend = memory_backend().await;

    backend.group_add("g", "a", Some(-1)).await.unwrap();
    backend.group_add("g", "b", Some(-1)).await.unwrap();

    assert!(backend.group_channels("g").await.unwrap().is_empty());
}

#[tokio::test]
async fn orders_scenario() {
    // ---
    // Backend with expiry=60; send, receive, then nothing remains.
    let backend = create_backend(&ChannelConfig::memory().with_expiry_secs(60))
        .await
        .unwrap();

    backend.send("orders", msg(json!({"id": 1}))).await.unwrap();

    let (channel, message) = backend
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .expect("message available immediately");
    assert_eq!(channel, "orders");
    assert_eq!(message, msg(json!({"id": 1})));

    assert!(backend
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn blocking_receive_wakes_on_send() {
    // ---
    let backend = memory_backend().await;
    let sender = backend.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        sender.send("jobs", msg(json!({"job": 7}))).await.unwrap();
    });

    let (channel, message) = timeout(
        Duration::from_secs(2),
        backend.receive_many_blocking(&names(&["jobs"])),
    )
    .await
    .expect("blocking receive should complete once a message arrives")
    .unwrap();

    assert_eq!(channel, "jobs");
    assert_eq!(message["job"], json!(7));
}

#[tokio::test]
async fn flush_drops_all_state() {
    // ---
    let backend = memory_backend().await;

    backend.send("orders", msg(json!({"id": 1}))).await.unwrap();
    backend.group_add("g", "orders", None).await.unwrap();

    backend.flush().await.unwrap();

    assert!(backend
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .is_none());
    assert!(backend.group_channels("g").await.unwrap().is_empty());
}

#[tokio::test]
async fn memory_backend_is_local_only_and_unlockable() {
    // ---
    let backend = memory_backend().await;

    assert!(backend.local_only());
    assert!(backend.locking().is_none());
}

#[tokio::test]
async fn independent_instances_do_not_share_queues() {
    // ---
    let first = memory_backend().await;
    let second = memory_backend().await;

    first.send("orders", msg(json!({"id": 1}))).await.unwrap();

    assert!(second
        .receive_many(&names(&["orders"]))
        .await
        .unwrap()
        .is_none());
}
