//! Fetch-or-cache behaviour of entity managers over a scripted transport.

mod common;

use std::sync::Arc;

use common::{MockTransport, Reply, builder, channel_json, client, member_json, message_json};
use huginn::{
    EntityKind, FetchOptions, HuginnError, MessageCreate, MessageQuery, MessageUpdate,
    Method,
};
use serde_json::json;

#[tokio::test]
async fn fetch_hits_rest_once_then_serves_same_arc() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1/messages/m1",
        Reply::Json(json!({ "message": message_json("m1", "c1", "hello") })),
    );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    let first = messages.fetch(&"m1".into(), FetchOptions::default()).await.unwrap();
    let second = messages.fetch(&"m1".into(), FetchOptions::default()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.call_count(), 1);
    assert_eq!(first.content.as_deref(), Some("hello"));
}

#[tokio::test]
async fn forced_fetch_replaces_stale_entry() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            "/channels/c1/messages/m1",
            Reply::Json(json!({ "message": message_json("m1", "c1", "old") })),
        )
        .reply(
            Method::Get,
            "/channels/c1/messages/m1",
            Reply::Json(json!({ "message": message_json("m1", "c1", "new") })),
        );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    let stale = messages.fetch(&"m1".into(), FetchOptions::default()).await.unwrap();
    let fresh = messages.fetch(&"m1".into(), FetchOptions::forced()).await.unwrap();

    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(stale.content.as_deref(), Some("old"));
    let cached = messages.get(&"m1".into()).unwrap();
    assert!(Arc::ptr_eq(&cached, &fresh));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn uncached_fetch_leaves_cache_empty() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1/messages/m1",
        Reply::Json(json!({ "message": message_json("m1", "c1", "hello") })),
    );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    messages
        .fetch(&"m1".into(), FetchOptions::default().cache(false))
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn capped_manager_evicts_oldest() {
    let transport = MockTransport::new();
    for id in ["m1", "m2", "m3"] {
        transport.reply(
            Method::Get,
            &format!("/channels/c1/messages/{id}"),
            Reply::Json(json!({ "message": message_json(id, "c1", id) })),
        );
    }
    let client = builder(&transport)
        .max_cache(EntityKind::Message, Some(2))
        .build()
        .unwrap();
    let messages = client.messages(&"c1".to_string()).unwrap();

    for id in ["m1", "m2", "m3"] {
        messages.fetch(&id.into(), FetchOptions::default()).await.unwrap();
    }

    assert_eq!(messages.len(), 2);
    assert!(messages.get(&"m1".into()).is_none());
    let ids: Vec<_> = messages.cached().iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec!["m2", "m3"]);
}

#[tokio::test]
async fn fetch_many_caches_page_and_keeps_others() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            "/channels/c1/messages/m0",
            Reply::Json(json!({ "message": message_json("m0", "c1", "older") })),
        )
        .reply(
            Method::Get,
            "/channels/c1/messages",
            Reply::Json(json!({
                "messages": [message_json("m1", "c1", "a"), message_json("m2", "c1", "b")]
            })),
        );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();
    messages.fetch(&"m0".into(), FetchOptions::default()).await.unwrap();

    let query = MessageQuery {
        limit: Some(2),
        ..Default::default()
    };
    let page = messages.fetch_many(&query, None).await.unwrap();

    assert_eq!(page.keys().cloned().collect::<Vec<_>>(), vec!["m1", "m2"]);
    assert_eq!(messages.len(), 3);
    let request = transport.requests().pop().unwrap();
    assert_eq!(request.query, vec![("limit".to_string(), "2".to_string())]);
}

#[tokio::test]
async fn fetch_many_without_cache_leaves_manager_untouched() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1/messages",
        Reply::Json(json!({ "messages": [message_json("m1", "c1", "a")] })),
    );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    let page = messages
        .fetch_many(&MessageQuery::default(), Some(false))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert!(messages.is_empty());
}

#[tokio::test]
async fn create_and_update_cache_new_snapshots() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Post,
            "/channels/c1/messages",
            Reply::Json(json!({ "message": message_json("m1", "c1", "draft") })),
        )
        .reply(
            Method::Put,
            "/channels/c1/messages/m1",
            Reply::Json(json!({ "message": message_json("m1", "c1", "final") })),
        );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    let created = messages.create(&MessageCreate::text("draft")).await.unwrap();
    let updated = messages
        .update(&"m1".into(), &MessageUpdate::text("final"))
        .await
        .unwrap();

    assert_eq!(created.content.as_deref(), Some("draft"), "snapshot is immutable");
    assert!(Arc::ptr_eq(&messages.get(&"m1".into()).unwrap(), &updated));

    let requests = transport.requests();
    assert_eq!(requests[0].body, Some(json!({ "content": "draft" })));
    assert_eq!(requests[1].method, Method::Put);
}

#[tokio::test]
async fn delete_disposes_by_default() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            "/channels/c1/messages/m1",
            Reply::Json(json!({ "message": message_json("m1", "c1", "bye") })),
        )
        .reply(Method::Delete, "/channels/c1/messages/m1", Reply::Empty);
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();
    messages.fetch(&"m1".into(), FetchOptions::default()).await.unwrap();

    let removed = messages.delete(&"m1".into()).await.unwrap();
    assert_eq!(removed.map(|m| m.id.clone()), Some("m1".to_string()));
    assert!(messages.is_empty());
}

#[tokio::test]
async fn delete_without_dispose_keeps_entry() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            "/channels/c1/messages/m1",
            Reply::Json(json!({ "message": message_json("m1", "c1", "bye") })),
        )
        .reply(Method::Delete, "/channels/c1/messages/m1", Reply::Empty);
    let client = builder(&transport)
        .dispose_cached(EntityKind::Message, false)
        .build()
        .unwrap();
    let messages = client.messages(&"c1".to_string()).unwrap();
    messages.fetch(&"m1".into(), FetchOptions::default()).await.unwrap();

    assert!(messages.delete(&"m1".into()).await.unwrap().is_none());
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn failed_write_leaves_cache_unchanged() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            "/channels/c1/messages/m1",
            Reply::Json(json!({ "message": message_json("m1", "c1", "keep") })),
        )
        .reply(Method::Put, "/channels/c1/messages/m1", Reply::Status(403))
        .reply(Method::Delete, "/channels/c1/messages/m1", Reply::Status(500));
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();
    let before = messages.fetch(&"m1".into(), FetchOptions::default()).await.unwrap();

    let err = messages
        .update(&"m1".into(), &MessageUpdate::text("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
    let err = messages.delete(&"m1".into()).await.unwrap_err();
    assert!(err.is_transient());

    assert!(Arc::ptr_eq(&messages.get(&"m1".into()).unwrap(), &before));
}

#[tokio::test]
async fn missing_entity_propagates_api_error() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    let err = messages
        .fetch(&"ghost".into(), FetchOptions::default())
        .await
        .unwrap_err();
    match err {
        HuginnError::Api { status, method, path, .. } => {
            assert_eq!(status, 404);
            assert_eq!(method, Method::Get);
            assert_eq!(path, "/channels/c1/messages/ghost");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(messages.is_empty());
}

#[tokio::test]
async fn malformed_envelope_is_decode_error() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1/messages/m1",
        Reply::Json(json!({ "msg": {} })),
    );
    let client = client(&transport);
    let messages = client.messages(&"c1".to_string()).unwrap();

    let err = messages
        .fetch(&"m1".into(), FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HuginnError::Decode(_)));
}

#[tokio::test]
async fn channel_fetch_builds_typed_variant_with_child_manager() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        "/channels/c1",
        Reply::Json(json!({ "channel": channel_json("c1", "s1", "chat") })),
    );
    let client = client(&transport);

    let channel = client
        .channels()
        .fetch(&"c1".into(), FetchOptions::default())
        .await
        .unwrap();
    let messages = channel.messages().expect("chat channel has messages");
    assert!(Arc::ptr_eq(messages, &client.messages(&"c1".to_string()).unwrap()));
    assert!(channel.docs().is_none());
}

#[tokio::test]
async fn member_writes_patch_cached_snapshot() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            "/servers/s1/members/u1",
            Reply::Json(json!({ "member": member_json("u1", "alice") })),
        )
        .reply(
            Method::Put,
            "/servers/s1/members/u1/nickname",
            Reply::Json(json!({ "nickname": "al" })),
        )
        .reply(Method::Put, "/servers/s1/members/u1/roles/7", Reply::Empty);
    let client = client(&transport);
    let members = client.members(&"s1".to_string()).unwrap();
    let before = members.fetch(&"u1".into(), FetchOptions::default()).await.unwrap();

    let renamed = members.set_nickname(&"u1".into(), Some("al")).await.unwrap().unwrap();
    let promoted = members.add_role(&"u1".into(), 7).await.unwrap().unwrap();

    assert_eq!(before.display_name(), "alice");
    assert_eq!(renamed.display_name(), "al");
    assert_eq!(promoted.role_ids, vec![1, 7]);
    assert_eq!(promoted.server_id, "s1");
}

#[tokio::test]
async fn child_managers_are_per_scope() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let c1 = client.messages(&"c1".to_string()).unwrap();
    let c2 = client.messages(&"c2".to_string()).unwrap();

    assert!(Arc::ptr_eq(&c1, &client.messages(&"c1".to_string()).unwrap()));
    assert!(!Arc::ptr_eq(&c1, &c2));
    assert_eq!(c2.scope(), "c2");
}
