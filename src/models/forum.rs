//! Forum topics and their comments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChannelId, CommentId, EntityKind, ForumTopicId, Mentions, ServerId, decode};
use crate::Result;
use crate::manager::{
    Creatable, Deletable, EntityManager, Listable, ManagerRegistry, Resource, Updatable,
};
use crate::rest::Method;

/// Registry for the per-topic comment managers.
#[derive(Clone, Debug)]
pub struct ForumTopicDeps {
    pub(crate) comments: Arc<ManagerRegistry<ForumTopicComment>>,
}

impl ForumTopicDeps {
    pub(crate) fn teardown(&self, channel_id: &ChannelId, topic_id: ForumTopicId) {
        self.comments.remove(&(channel_id.clone(), topic_id));
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForumTopicData {
    id: ForumTopicId,
    server_id: ServerId,
    channel_id: ChannelId,
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    mentions: Option<Mentions>,
    created_at: DateTime<Utc>,
    created_by: String,
    #[serde(default)]
    created_by_webhook_id: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    bumped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_pinned: bool,
    #[serde(default)]
    is_locked: bool,
}

/// A forum topic. Owns the comment manager for the topic.
#[derive(Debug, Clone)]
pub struct ForumTopic {
    pub id: ForumTopicId,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub title: String,
    pub content: Option<String>,
    pub mentions: Option<Mentions>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub created_by_webhook_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub bumped_at: Option<DateTime<Utc>>,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    comments: Arc<EntityManager<ForumTopicComment>>,
}

impl ForumTopic {
    pub fn comments(&self) -> &Arc<EntityManager<ForumTopicComment>> {
        &self.comments
    }
}

impl Resource for ForumTopic {
    type Id = ForumTopicId;
    type Scope = ChannelId;
    type Deps = ForumTopicDeps;

    const KIND: EntityKind = EntityKind::ForumTopic;
    const SINGULAR: &'static str = "forumTopic";
    const PLURAL: &'static str = "forumTopics";

    fn id(&self) -> ForumTopicId {
        self.id
    }

    fn collection_path(channel_id: &ChannelId) -> String {
        format!("/channels/{channel_id}/topics")
    }

    fn from_payload(_: &ChannelId, deps: &ForumTopicDeps, payload: Value) -> Result<Self> {
        let data: ForumTopicData = decode(Self::KIND, payload)?;
        let comments = deps
            .comments
            .get_or_create(&(data.channel_id.clone(), data.id))?;
        Ok(Self {
            id: data.id,
            server_id: data.server_id,
            channel_id: data.channel_id,
            title: data.title,
            content: data.content,
            mentions: data.mentions,
            created_at: data.created_at,
            created_by: data.created_by,
            created_by_webhook_id: data.created_by_webhook_id,
            updated_at: data.updated_at,
            bumped_at: data.bumped_at,
            is_pinned: data.is_pinned,
            is_locked: data.is_locked,
            deleted_at: None,
            comments,
        })
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ForumTopicQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForumTopicCreate {
    pub title: String,
    pub content: String,
}

impl ForumTopicCreate {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ForumTopicUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Listable for ForumTopic {
    type Query = ForumTopicQuery;
}

impl Creatable for ForumTopic {
    type Create = ForumTopicCreate;
}

impl Updatable for ForumTopic {
    type Update = ForumTopicUpdate;
}

impl Deletable for ForumTopic {}

impl EntityManager<ForumTopic> {
    pub async fn pin(&self, topic_id: ForumTopicId) -> Result<Option<Arc<ForumTopic>>> {
        self.toggle(topic_id, "pin", Method::Put).await?;
        Ok(self.patch_cached(&topic_id, |topic| topic.is_pinned = true))
    }

    pub async fn unpin(&self, topic_id: ForumTopicId) -> Result<Option<Arc<ForumTopic>>> {
        self.toggle(topic_id, "pin", Method::Delete).await?;
        Ok(self.patch_cached(&topic_id, |topic| topic.is_pinned = false))
    }

    pub async fn lock(&self, topic_id: ForumTopicId) -> Result<Option<Arc<ForumTopic>>> {
        self.toggle(topic_id, "lock", Method::Put).await?;
        Ok(self.patch_cached(&topic_id, |topic| topic.is_locked = true))
    }

    pub async fn unlock(&self, topic_id: ForumTopicId) -> Result<Option<Arc<ForumTopic>>> {
        self.toggle(topic_id, "lock", Method::Delete).await?;
        Ok(self.patch_cached(&topic_id, |topic| topic.is_locked = false))
    }

    async fn toggle(&self, topic_id: ForumTopicId, flag: &str, method: Method) -> Result<()> {
        let path = format!("{}/{flag}", ForumTopic::item_path(self.scope(), &topic_id));
        self.touch(method, path).await
    }
}

/// A comment on a forum topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumTopicComment {
    pub id: CommentId,
    pub content: String,
    pub channel_id: ChannelId,
    pub forum_topic_id: ForumTopicId,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mentions: Option<Mentions>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource for ForumTopicComment {
    type Id = CommentId;
    /// (channel id, topic id)
    type Scope = (ChannelId, ForumTopicId);
    type Deps = ();

    const KIND: EntityKind = EntityKind::ForumTopicComment;
    const SINGULAR: &'static str = "forumTopicComment";
    const PLURAL: &'static str = "forumTopicComments";

    fn id(&self) -> CommentId {
        self.id
    }

    fn collection_path((channel_id, topic_id): &(ChannelId, ForumTopicId)) -> String {
        format!("/channels/{channel_id}/topics/{topic_id}/comments")
    }

    fn from_payload(_: &(ChannelId, ForumTopicId), _: &(), payload: Value) -> Result<Self> {
        decode(Self::KIND, payload)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForumTopicCommentCreate {
    pub content: String,
}

impl ForumTopicCommentCreate {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

pub type ForumTopicCommentUpdate = ForumTopicCommentCreate;

impl Listable for ForumTopicComment {
    type Query = ();
}

impl Creatable for ForumTopicComment {
    type Create = ForumTopicCommentCreate;
}

impl Updatable for ForumTopicComment {
    type Update = ForumTopicCommentUpdate;
}

impl Deletable for ForumTopicComment {}
