//! Integration tests for the channel fabric: registration, fan-out,
//! ordering, origin suppression, and the notification bridge path from
//! a published job message to a channel frame.

use std::sync::Arc;

use ripple::channels::{Channel, ConnectionManager, Envelope};
use ripple::queue::NotificationBridge;
use ripple::store::SharedStore;

fn manager() -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(
        vec![
            "users".to_string(),
            "media".to_string(),
            "tasks".to_string(),
        ],
        32,
    ))
}

async fn next_frame(rx: &mut tokio::sync::broadcast::Receiver<String>) -> serde_json::Value {
    let frame = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
        .await
        .expect("frame within 500ms")
        .expect("queue alive");
    serde_json::from_str(&frame).expect("frame is JSON")
}

#[tokio::test]
async fn created_envelope_reaches_subscriber_with_matching_id() {
    let manager = manager();
    let channel = Channel::new("users", manager.clone());

    let (_id, mut rx) = manager.connect("users", Some("c1".to_string())).await.unwrap();
    let welcome = next_frame(&mut rx).await;
    assert_eq!(welcome["type"], "connection");

    channel
        .broadcast_created(serde_json::json!({"id": 1, "email": "a@b"}))
        .await;

    let frame = next_frame(&mut rx).await;
    assert_eq!(frame["type"], "created");
    assert_eq!(frame["channel"], "users");
    assert_eq!(frame["model"], "users");
    assert_eq!(frame["data"]["id"], 1);
    assert_eq!(frame["data"]["email"], "a@b");
}

#[tokio::test]
async fn frames_arrive_in_emission_order_per_client() {
    let manager = manager();
    let channel = Channel::new("users", manager.clone());

    let (_id, mut rx) = manager.connect("users", None).await.unwrap();
    next_frame(&mut rx).await; // welcome

    for seq in 0..10 {
        channel
            .broadcast_custom("custom", serde_json::json!({ "seq": seq }))
            .await;
    }
    for seq in 0..10 {
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["data"]["seq"], seq);
    }
}

#[tokio::test]
async fn origin_suppression_skips_the_sender() {
    let manager = manager();
    let (_a, mut rx_a) = manager.connect("media", Some("origin".to_string())).await.unwrap();
    let (_b, mut rx_b) = manager.connect("media", Some("other".to_string())).await.unwrap();
    next_frame(&mut rx_a).await;
    next_frame(&mut rx_b).await;

    let delivered = manager
        .broadcast_to_channel(
            "media",
            Envelope::model_event("updated", "media", serde_json::json!({"id": 9})),
            Some("origin"),
        )
        .await;
    assert_eq!(delivered, 1);

    let frame = next_frame(&mut rx_b).await;
    assert_eq!(frame["data"]["id"], 9);
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn cross_channel_broadcast_reaches_every_channel() {
    let manager = manager();
    let (_u, mut rx_users) = manager.connect("users", None).await.unwrap();
    let (_m, mut rx_media) = manager.connect("media", None).await.unwrap();
    next_frame(&mut rx_users).await;
    next_frame(&mut rx_media).await;

    let mut notice = Envelope::new("custom");
    notice.message = Some("maintenance in 5 minutes".to_string());
    let delivered = manager.broadcast_to_all_channels(notice).await;
    assert_eq!(delivered, 2);

    let users_frame = next_frame(&mut rx_users).await;
    let media_frame = next_frame(&mut rx_media).await;
    assert_eq!(users_frame["channel"], "users");
    assert_eq!(media_frame["channel"], "media");
}

#[tokio::test]
async fn bridge_message_becomes_task_notification_frame() {
    let manager = manager();
    let bridge = NotificationBridge::new(SharedStore::disabled(), manager.clone());

    let (_id, mut rx) = manager.connect("media", None).await.unwrap();
    next_frame(&mut rx).await;

    // Simulate the three progress messages a media job publishes, then
    // the terminal updated frame
    for progress in [33, 66, 99] {
        bridge
            .forward(serde_json::json!({
                "type": "task_notification",
                "channel": "media",
                "data": {"media_id": 42, "progress": progress},
            }))
            .await;
    }
    bridge
        .forward(serde_json::json!({
            "type": "updated",
            "channel": "media",
            "data": {"id": 42, "processed": true},
        }))
        .await;

    for progress in [33, 66, 99] {
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["type"], "task_notification");
        assert_eq!(frame["data"]["progress"], progress);
    }
    let terminal = next_frame(&mut rx).await;
    assert_eq!(terminal["type"], "updated");
    assert_eq!(terminal["data"]["processed"], true);
}

#[tokio::test]
async fn stats_shape_matches_contract() {
    let manager = manager();
    let (_a, _rx_a) = manager.connect("users", None).await.unwrap();
    let (_b, _rx_b) = manager.connect("tasks", None).await.unwrap();

    let stats = manager.stats().await;
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["total_channels"], 2);
    assert_eq!(json["total_connections"], 2);
    assert_eq!(json["channels"]["users"], 1);
    assert_eq!(json["channels"]["tasks"], 1);
}
