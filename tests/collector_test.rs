//! Collector bounds, disposal and end semantics.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockTransport, Reply, channel_json, client, member_json, message_json, server_json};
use huginn::{
    Collector, CollectorEvent, CollectorOptions, EndReason, FetchOptions, Message, Method,
    ServerMember, StreamEvent,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;

fn message(id: &str, content: &str) -> Arc<Message> {
    Arc::new(serde_json::from_value(message_json(id, "c1", content)).unwrap())
}

fn data(kind: &str, payload: Value) -> StreamEvent {
    StreamEvent::Data {
        kind: kind.to_string(),
        payload,
    }
}

async fn next(
    notifications: &mut broadcast::Receiver<CollectorEvent<Message>>,
) -> CollectorEvent<Message> {
    tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .expect("collector notification timed out")
        .unwrap()
}

#[tokio::test]
async fn max_ends_with_limit() {
    let collector = Collector::new(CollectorOptions::default().max(2), |_: &Message| true);
    let mut events = collector.subscribe();

    assert!(collector.collect(message("m1", "a")).await);
    assert!(collector.collect(message("m2", "b")).await);
    assert!(!collector.collect(message("m3", "c")).await);

    assert_eq!(collector.end_reason(), Some(EndReason::Limit));
    let ids: Vec<_> = collector.collected().keys().cloned().collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    assert!(matches!(events.recv().await, Ok(CollectorEvent::Collected(_))));
    assert!(matches!(events.recv().await, Ok(CollectorEvent::Collected(_))));
    match events.recv().await {
        Ok(CollectorEvent::End { collected, reason }) => {
            assert_eq!(reason, EndReason::Limit);
            assert_eq!(collected.len(), 2);
        }
        other => panic!("expected end, got {other:?}"),
    }
}

#[tokio::test]
async fn filter_rejections_are_not_collected() {
    let collector = Collector::new(CollectorOptions::default(), |m: &Message| {
        m.content.as_deref() == Some("yes")
    });

    assert!(!collector.collect(message("m1", "no")).await);
    assert!(collector.collect(message("m2", "yes")).await);
    assert_eq!(collector.collected().len(), 1);
    assert!(!collector.is_ended());
}

#[tokio::test]
async fn async_filter_is_awaited() {
    let collector = Collector::with_async_filter(CollectorOptions::default(), |m: Arc<Message>| async move {
        tokio::task::yield_now().await;
        m.id != "m1"
    });

    assert!(!collector.collect(message("m1", "a")).await);
    assert!(collector.collect(message("m2", "b")).await);
}

#[tokio::test(start_paused = true)]
async fn idle_timer_restarts_on_collect() {
    let collector = Collector::new(
        CollectorOptions::default().idle(Duration::from_millis(100)),
        |_: &Message| true,
    );

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(collector.collect(message("m1", "a")).await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!collector.is_ended(), "collect must reset the idle timer");

    let collected = collector.wait().await;
    assert_eq!(collected.len(), 1);
    assert_eq!(collector.end_reason(), Some(EndReason::Idle));
    let lifetime = collector.ended_at().unwrap() - collector.created_at();
    assert!(lifetime >= Duration::from_millis(160));
}

#[tokio::test(start_paused = true)]
async fn time_bound_ignores_activity() {
    let collector = Collector::new(
        CollectorOptions::default()
            .time(Duration::from_millis(100))
            .idle(Duration::from_secs(10)),
        |_: &Message| true,
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(collector.collect(message("m1", "a")).await);

    collector.wait().await;
    assert_eq!(collector.end_reason(), Some(EndReason::Time));
    assert!(!collector.collect(message("m2", "b")).await);
}

#[tokio::test]
async fn dispose_removes_collected_item() {
    let collector = Collector::new(CollectorOptions::default(), |_: &Message| true);
    collector.collect(message("m1", "a")).await;
    collector.collect(message("m2", "b")).await;

    let removed = collector.dispose(&"m1".to_string()).unwrap();
    assert_eq!(removed.id, "m1");
    assert!(collector.dispose(&"m1".to_string()).is_none());
    assert_eq!(collector.collected().len(), 1);
}

#[tokio::test]
async fn dispose_disabled_keeps_items() {
    let collector = Collector::new(CollectorOptions::default().dispose(false), |_: &Message| true);
    collector.collect(message("m1", "a")).await;

    assert!(collector.dispose(&"m1".to_string()).is_none());
    assert_eq!(collector.collected().len(), 1);
}

#[tokio::test]
async fn end_is_idempotent_and_freezes_state() {
    let collector = Collector::new(CollectorOptions::default(), |_: &Message| true);
    let mut events = collector.subscribe();
    collector.collect(message("m1", "a")).await;

    collector.end();
    let ended_at = collector.ended_at();
    collector.end();

    assert_eq!(collector.ended_at(), ended_at);
    assert_eq!(collector.end_reason(), Some(EndReason::Manual));
    assert!(!collector.collect(message("m2", "b")).await);
    assert!(collector.dispose(&"m1".to_string()).is_none());

    assert!(matches!(events.recv().await, Ok(CollectorEvent::Collected(_))));
    assert!(matches!(events.recv().await, Ok(CollectorEvent::End { .. })));
    assert!(events.try_recv().is_err(), "only one end notification");
}

#[tokio::test]
async fn client_collector_feeds_from_pipeline() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1",
        Reply::Json(json!({ "channel": channel_json("c1", "s1", "chat") })),
    );
    let client = client(&transport);
    client
        .channels()
        .fetch(&"c1".into(), FetchOptions::default())
        .await
        .unwrap();

    let collector = client.message_collector("c1", CollectorOptions::default().max(2), |m| {
        m.content.as_deref() != Some("skip")
    });

    let pipeline = client.pipeline();
    for (id, content) in [("m1", "one"), ("m2", "skip"), ("m3", "three"), ("m4", "four")] {
        pipeline
            .dispatch(data(
                "ChatMessageCreated",
                json!({ "serverId": "s1", "message": message_json(id, "c1", content) }),
            ))
            .await;
    }

    let collected = tokio::time::timeout(Duration::from_secs(5), collector.wait())
        .await
        .unwrap();
    let ids: Vec<_> = collected.keys().cloned().collect();
    assert_eq!(ids, vec!["m1", "m3"]);
    assert_eq!(collector.end_reason(), Some(EndReason::Limit));
}

#[tokio::test]
async fn client_collector_disposes_deleted_messages() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1",
        Reply::Json(json!({ "channel": channel_json("c1", "s1", "chat") })),
    );
    let client = client(&transport);
    client
        .channels()
        .fetch(&"c1".into(), FetchOptions::default())
        .await
        .unwrap();
    let collector = client.message_collector("c1", CollectorOptions::default(), |_| true);
    let mut notifications = collector.subscribe();

    let pipeline = client.pipeline();
    pipeline
        .dispatch(data(
            "ChatMessageCreated",
            json!({ "message": message_json("m1", "c1", "hi") }),
        ))
        .await;
    pipeline
        .dispatch(data(
            "ChatMessageDeleted",
            json!({ "message": { "id": "m1", "channelId": "c1" } }),
        ))
        .await;

    assert!(matches!(
        next(&mut notifications).await,
        CollectorEvent::Collected(_)
    ));
    assert!(matches!(
        next(&mut notifications).await,
        CollectorEvent::Disposed(_)
    ));
    assert!(collector.collected().is_empty());
    collector.end();
}

#[tokio::test]
async fn client_collector_disposes_removed_members() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/servers/s1",
        Reply::Json(json!({ "server": server_json("s1") })),
    );
    let client = client(&transport);
    client
        .servers()
        .fetch(&"s1".into(), FetchOptions::default())
        .await
        .unwrap();
    let collector = client.collector::<ServerMember, _>(CollectorOptions::default(), |_| true);
    let mut notifications = collector.subscribe();

    let pipeline = client.pipeline();
    pipeline
        .dispatch(data(
            "ServerMemberJoined",
            json!({ "serverId": "s1", "member": member_json("u1", "alice") }),
        ))
        .await;
    pipeline
        .dispatch(data(
            "ServerMemberRemoved",
            json!({ "serverId": "s1", "userId": "u1", "isKick": true }),
        ))
        .await;

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
            .await
            .expect("collector notification timed out")
            .unwrap();
        seen.push(event);
    }
    assert!(matches!(seen[0], CollectorEvent::Collected(_)));
    match &seen[1] {
        CollectorEvent::Disposed(member) => assert_eq!(member.user.id, "u1"),
        other => panic!("expected disposal, got {other:?}"),
    }
    assert!(collector.collected().is_empty());
    collector.end();
}
