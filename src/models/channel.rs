//! Channels.
//!
//! A channel payload carries a `type` tag; [`Channel`] is the sum type over
//! the kinds the client distinguishes, built through a single type →
//! constructor table. Content channels own the child manager for their
//! content kind (messages, docs, topics, calendar events, list items).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CalendarEvent, ChannelId, Doc, EntityKind, ForumTopic, ForumTopicComment, ListItem, Message,
    ServerId, decode,
};
use crate::Result;
use crate::manager::{Creatable, Deletable, EntityManager, ManagerRegistry, Resource, Updatable};

/// Channel type tag as sent by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Announcements,
    Chat,
    Calendar,
    Forums,
    Media,
    Docs,
    Voice,
    List,
    Scheduling,
    Stream,
    /// A type this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Fields shared by every channel kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub server_id: ServerId,
    #[serde(default)]
    pub parent_id: Option<ChannelId>,
    #[serde(default)]
    pub category_id: Option<u64>,
    pub group_id: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub archived_by: Option<String>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    /// Set when the channel was deleted and the snapshot is kept as a
    /// tombstone.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Chat, voice, stream and announcement channels: anything with messages.
#[derive(Debug, Clone)]
pub struct TextChannel {
    pub data: ChannelData,
    messages: Arc<EntityManager<Message>>,
}

impl TextChannel {
    pub fn messages(&self) -> &Arc<EntityManager<Message>> {
        &self.messages
    }
}

#[derive(Debug, Clone)]
pub struct DocsChannel {
    pub data: ChannelData,
    docs: Arc<EntityManager<Doc>>,
}

impl DocsChannel {
    pub fn docs(&self) -> &Arc<EntityManager<Doc>> {
        &self.docs
    }
}

#[derive(Debug, Clone)]
pub struct ForumChannel {
    pub data: ChannelData,
    topics: Arc<EntityManager<ForumTopic>>,
}

impl ForumChannel {
    pub fn topics(&self) -> &Arc<EntityManager<ForumTopic>> {
        &self.topics
    }
}

#[derive(Debug, Clone)]
pub struct CalendarChannel {
    pub data: ChannelData,
    events: Arc<EntityManager<CalendarEvent>>,
}

impl CalendarChannel {
    pub fn events(&self) -> &Arc<EntityManager<CalendarEvent>> {
        &self.events
    }
}

#[derive(Debug, Clone)]
pub struct ListChannel {
    pub data: ChannelData,
    items: Arc<EntityManager<ListItem>>,
}

impl ListChannel {
    pub fn items(&self) -> &Arc<EntityManager<ListItem>> {
        &self.items
    }
}

/// A channel of any kind.
#[derive(Debug, Clone)]
pub enum Channel {
    Text(TextChannel),
    Docs(DocsChannel),
    Forum(ForumChannel),
    Calendar(CalendarChannel),
    List(ListChannel),
    /// Media, scheduling and unknown channel types. No content manager.
    Basic(ChannelData),
}

impl Channel {
    pub fn data(&self) -> &ChannelData {
        match self {
            Channel::Text(c) => &c.data,
            Channel::Docs(c) => &c.data,
            Channel::Forum(c) => &c.data,
            Channel::Calendar(c) => &c.data,
            Channel::List(c) => &c.data,
            Channel::Basic(data) => data,
        }
    }

    fn data_mut(&mut self) -> &mut ChannelData {
        match self {
            Channel::Text(c) => &mut c.data,
            Channel::Docs(c) => &mut c.data,
            Channel::Forum(c) => &mut c.data,
            Channel::Calendar(c) => &mut c.data,
            Channel::List(c) => &mut c.data,
            Channel::Basic(data) => data,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        self.data().channel_type
    }

    pub fn server_id(&self) -> &ServerId {
        &self.data().server_id
    }

    pub fn messages(&self) -> Option<&Arc<EntityManager<Message>>> {
        match self {
            Channel::Text(c) => Some(c.messages()),
            _ => None,
        }
    }

    pub fn docs(&self) -> Option<&Arc<EntityManager<Doc>>> {
        match self {
            Channel::Docs(c) => Some(c.docs()),
            _ => None,
        }
    }

    pub fn topics(&self) -> Option<&Arc<EntityManager<ForumTopic>>> {
        match self {
            Channel::Forum(c) => Some(c.topics()),
            _ => None,
        }
    }

    pub fn calendar_events(&self) -> Option<&Arc<EntityManager<CalendarEvent>>> {
        match self {
            Channel::Calendar(c) => Some(c.events()),
            _ => None,
        }
    }

    pub fn list_items(&self) -> Option<&Arc<EntityManager<ListItem>>> {
        match self {
            Channel::List(c) => Some(c.items()),
            _ => None,
        }
    }
}

/// Registries for the per-channel content managers.
#[derive(Clone, Debug)]
pub struct ChannelDeps {
    pub(crate) messages: Arc<ManagerRegistry<Message>>,
    pub(crate) docs: Arc<ManagerRegistry<Doc>>,
    pub(crate) topics: Arc<ManagerRegistry<ForumTopic>>,
    pub(crate) events: Arc<ManagerRegistry<CalendarEvent>>,
    pub(crate) items: Arc<ManagerRegistry<ListItem>>,
    pub(crate) comments: Arc<ManagerRegistry<ForumTopicComment>>,
}

impl ChannelDeps {
    /// Drop every content manager of a discarded channel, including the
    /// comment managers of its topics.
    pub(crate) fn teardown(&self, channel_id: &ChannelId) {
        self.messages.remove(channel_id);
        self.docs.remove(channel_id);
        self.topics.remove(channel_id);
        self.events.remove(channel_id);
        self.items.remove(channel_id);
        self.comments.retain(|(channel, _)| channel != channel_id);
    }
}

type Constructor = fn(ChannelData, &ChannelDeps) -> Result<Channel>;

/// Channel type → constructor.
fn constructor(channel_type: ChannelType) -> Constructor {
    match channel_type {
        ChannelType::Chat
        | ChannelType::Voice
        | ChannelType::Stream
        | ChannelType::Announcements => text_channel,
        ChannelType::Docs => docs_channel,
        ChannelType::Forums => forum_channel,
        ChannelType::Calendar => calendar_channel,
        ChannelType::List => list_channel,
        ChannelType::Media | ChannelType::Scheduling | ChannelType::Unknown => basic_channel,
    }
}

fn text_channel(data: ChannelData, deps: &ChannelDeps) -> Result<Channel> {
    let messages = deps.messages.get_or_create(&data.id)?;
    Ok(Channel::Text(TextChannel { data, messages }))
}

fn docs_channel(data: ChannelData, deps: &ChannelDeps) -> Result<Channel> {
    let docs = deps.docs.get_or_create(&data.id)?;
    Ok(Channel::Docs(DocsChannel { data, docs }))
}

fn forum_channel(data: ChannelData, deps: &ChannelDeps) -> Result<Channel> {
    let topics = deps.topics.get_or_create(&data.id)?;
    Ok(Channel::Forum(ForumChannel { data, topics }))
}

fn calendar_channel(data: ChannelData, deps: &ChannelDeps) -> Result<Channel> {
    let events = deps.events.get_or_create(&data.id)?;
    Ok(Channel::Calendar(CalendarChannel { data, events }))
}

fn list_channel(data: ChannelData, deps: &ChannelDeps) -> Result<Channel> {
    let items = deps.items.get_or_create(&data.id)?;
    Ok(Channel::List(ListChannel { data, items }))
}

fn basic_channel(data: ChannelData, _: &ChannelDeps) -> Result<Channel> {
    Ok(Channel::Basic(data))
}

impl Resource for Channel {
    type Id = ChannelId;
    type Scope = ();
    type Deps = ChannelDeps;

    const KIND: EntityKind = EntityKind::Channel;
    const SINGULAR: &'static str = "channel";
    const PLURAL: &'static str = "channels";

    fn id(&self) -> ChannelId {
        self.data().id.clone()
    }

    fn collection_path(_: &()) -> String {
        "/channels".to_string()
    }

    fn from_payload(_: &(), deps: &ChannelDeps, payload: Value) -> Result<Self> {
        let data: ChannelData = decode(Self::KIND, payload)?;
        constructor(data.channel_type)(data, deps)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.data().deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.data_mut().deleted_at = Some(at);
    }
}

/// Payload for creating a channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub server_id: ServerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u64>,
}

impl ChannelCreate {
    pub fn new(
        server_id: impl Into<ServerId>,
        name: impl Into<String>,
        channel_type: ChannelType,
    ) -> Self {
        Self {
            name: name.into(),
            channel_type,
            server_id: server_id.into(),
            topic: None,
            is_public: None,
            group_id: None,
            category_id: None,
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = Some(is_public);
        self
    }
}

/// Payload for updating a channel. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl Creatable for Channel {
    type Create = ChannelCreate;
}

impl Updatable for Channel {
    type Update = ChannelUpdate;
}

impl Deletable for Channel {}
