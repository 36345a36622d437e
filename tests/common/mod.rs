//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use huginn::{Client, HuginnError, Huginn, Method, RestRequest, RestTransport, Result, RetryConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Scripted reply for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Empty,
    Status(u16),
    RateLimited,
}

/// In-memory transport that records requests and replays scripted replies.
///
/// Unscripted requests fail with a 404.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<RestRequest>>,
    calls: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for `method path`. The last queued reply repeats.
    pub fn reply(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestTransport for MockTransport {
    async fn request(&self, request: RestRequest) -> Result<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let reply = {
            let mut replies = self.replies.lock();
            match replies.get_mut(&(request.method, request.path.clone())) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Json(body)) => Ok(Some(body)),
            Some(Reply::Empty) => Ok(None),
            Some(Reply::RateLimited) => Err(HuginnError::RateLimited { retry_after: None }),
            Some(Reply::Status(status)) => Err(api_error(status, &request)),
            None => Err(api_error(404, &request)),
        }
    }
}

fn api_error(status: u16, request: &RestRequest) -> HuginnError {
    HuginnError::Api {
        status,
        code: None,
        message: "scripted failure".into(),
        method: request.method,
        path: request.path.clone(),
        body: request.body.clone(),
    }
}

/// Client over a mock transport with retries disabled.
pub fn client(transport: &Arc<MockTransport>) -> Client {
    builder(transport).build().unwrap()
}

pub fn builder(transport: &Arc<MockTransport>) -> huginn::ClientBuilder {
    Huginn::builder()
        .token("test-token")
        .retry(RetryConfig::disabled())
        .transport(transport.clone())
}

pub fn server_json(id: &str) -> Value {
    json!({
        "id": id,
        "ownerId": "owner",
        "type": "community",
        "name": format!("server {id}"),
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

pub fn channel_json(id: &str, server_id: &str, channel_type: &str) -> Value {
    json!({
        "id": id,
        "type": channel_type,
        "name": format!("channel {id}"),
        "createdAt": "2024-01-01T00:00:00Z",
        "createdBy": "owner",
        "serverId": server_id,
        "groupId": "group"
    })
}

pub fn message_json(id: &str, channel_id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "type": "default",
        "serverId": "s1",
        "channelId": channel_id,
        "content": content,
        "createdAt": "2024-01-01T00:00:00Z",
        "createdBy": "u1"
    })
}

pub fn member_json(user_id: &str, name: &str) -> Value {
    json!({
        "user": { "id": user_id, "type": "user", "name": name },
        "roleIds": [1],
        "joinedAt": "2024-01-01T00:00:00Z"
    })
}

pub fn topic_json(id: u64, channel_id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "serverId": "s1",
        "channelId": channel_id,
        "title": title,
        "createdAt": "2024-01-01T00:00:00Z",
        "createdBy": "u1"
    })
}

pub fn comment_json(id: u64, channel_id: &str, topic_id: u64, content: &str) -> Value {
    json!({
        "id": id,
        "channelId": channel_id,
        "forumTopicId": topic_id,
        "content": content,
        "createdAt": "2024-01-01T00:00:00Z",
        "createdBy": "u1"
    })
}
