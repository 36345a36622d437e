//! Chat messages and reactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChannelId, EntityKind, Emote, Mentions, MessageId, ServerId, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, EntityManager, Listable, Resource, Updatable};
use crate::rest::Method;

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub server_id: Option<ServerId>,
    #[serde(default)]
    pub group_id: Option<String>,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub reply_message_ids: Vec<MessageId>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_silent: bool,
    #[serde(default)]
    pub mentions: Option<Mentions>,
    /// Absent on tombstones decoded from a bare `ChatMessageDeleted`.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_by_webhook_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the message was sent by a webhook rather than a user.
    pub fn is_webhook(&self) -> bool {
        self.created_by_webhook_id.is_some()
    }
}

impl Resource for Message {
    type Id = MessageId;
    type Scope = ChannelId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::Message;
    const SINGULAR: &'static str = "message";
    const PLURAL: &'static str = "messages";

    fn id(&self) -> MessageId {
        self.id.clone()
    }

    fn collection_path(channel_id: &ChannelId) -> String {
        format!("/channels/{channel_id}/messages")
    }

    fn from_payload(_: &ChannelId, _: &(), payload: Value) -> Result<Self> {
        decode(Self::KIND, payload)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

/// Filters for listing messages.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_private: Option<bool>,
}

/// Payload for sending a message.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reply_message_ids: Vec<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_silent: Option<bool>,
}

impl MessageCreate {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, message_id: impl Into<MessageId>) -> Self {
        self.reply_message_ids.push(message_id.into());
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = Some(is_private);
        self
    }

    pub fn silent(mut self, is_silent: bool) -> Self {
        self.is_silent = Some(is_silent);
        self
    }
}

/// Payload for editing a message.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Value>>,
}

impl MessageUpdate {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: None,
        }
    }
}

impl Listable for Message {
    type Query = MessageQuery;
}

impl Creatable for Message {
    type Create = MessageCreate;
}

impl Updatable for Message {
    type Update = MessageUpdate;

    const UPDATE_METHOD: Method = Method::Put;
}

impl Deletable for Message {}

impl EntityManager<Message> {
    /// Add an emote reaction to a message as the bot user.
    pub async fn react(&self, message_id: &MessageId, emote_id: u64) -> Result<()> {
        self.touch(Method::Put, emote_path(self.scope(), message_id, emote_id))
            .await
    }

    /// Remove the bot user's emote reaction from a message.
    pub async fn unreact(&self, message_id: &MessageId, emote_id: u64) -> Result<()> {
        self.touch(Method::Delete, emote_path(self.scope(), message_id, emote_id))
            .await
    }
}

fn emote_path(channel_id: &ChannelId, message_id: &MessageId, emote_id: u64) -> String {
    format!("/channels/{channel_id}/messages/{message_id}/emotes/{emote_id}")
}

/// An emote reaction on a message.
///
/// Reactions are not cached; they are surfaced through
/// [`Event::Reaction`](crate::Event::Reaction).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub created_by: String,
    pub emote: Emote,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_sparse_payload() {
        let message: Message = serde_json::from_value(json!({
            "id": "m1",
            "channelId": "c1",
            "content": "hi",
            "createdAt": "2024-01-01T00:00:00Z",
            "createdBy": "u1"
        }))
        .unwrap();
        assert_eq!(message.id, "m1");
        assert!(!message.is_deleted());
        assert!(message.embeds.is_empty());
    }

    #[test]
    fn decodes_delete_tombstone() {
        let message: Message = serde_json::from_value(json!({
            "id": "m9",
            "serverId": "s1",
            "channelId": "c1",
            "deletedAt": "2024-01-02T00:00:00Z",
            "isPrivate": false
        }))
        .unwrap();
        assert!(message.is_deleted());
        assert!(message.created_at.is_none());
        assert!(message.created_by.is_none());
    }

    #[test]
    fn create_payload_skips_defaults() {
        let body = serde_json::to_value(MessageCreate::text("hello").reply_to("m0")).unwrap();
        assert_eq!(
            body,
            json!({ "content": "hello", "replyMessageIds": ["m0"] })
        );
    }

    #[test]
    fn query_uses_camel_case() {
        let query = MessageQuery {
            limit: Some(10),
            include_private: Some(true),
            ..Default::default()
        };
        let pairs = crate::rest::query_pairs(&query).unwrap();
        assert!(pairs.contains(&("includePrivate".into(), "true".into())));
        assert!(pairs.contains(&("limit".into(), "10".into())));
    }
}
