//! Typed entities.
//!
//! Every entity is an immutable snapshot decoded from a JSON payload and
//! shared as `Arc<T>`. Owner links are kept as ids (`server_id`,
//! `channel_id`); entities that own children (servers, channels, forum
//! topics) carry handles to their child managers.

mod calendar;
mod channel;
mod doc;
mod forum;
mod list;
mod member;
mod message;
mod role;
mod server;
mod user;
mod webhook;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{HuginnError, Result};

pub use calendar::{
    CalendarEvent, CalendarEventCreate, CalendarEventQuery, CalendarEventUpdate, Cancellation,
};
pub use channel::{
    CalendarChannel, Channel, ChannelCreate, ChannelData, ChannelDeps, ChannelType, ChannelUpdate,
    DocsChannel, ForumChannel, ListChannel, TextChannel,
};
pub use doc::{Doc, DocCreate, DocQuery, DocUpdate};
pub use forum::{
    ForumTopic, ForumTopicComment, ForumTopicCommentCreate, ForumTopicCommentUpdate,
    ForumTopicCreate, ForumTopicDeps, ForumTopicQuery, ForumTopicUpdate,
};
pub use list::{ListItem, ListItemCreate, ListItemNote, ListItemUpdate};
pub use member::{BanCreate, ServerBan, ServerMember};
pub use message::{Message, MessageCreate, MessageQuery, MessageUpdate, Reaction};
pub use role::{Role, RoleCreate, RoleUpdate};
pub use server::{Server, ServerDeps};
pub use user::{ClientUser, User, UserSummary};
pub use webhook::{Webhook, WebhookCreate, WebhookUpdate};

pub type ServerId = String;
pub type ChannelId = String;
pub type MessageId = String;
pub type UserId = String;
pub type DocId = u64;
pub type ForumTopicId = u64;
pub type CommentId = u64;
pub type CalendarEventId = u64;
pub type ListItemId = String;
pub type RoleId = u64;
pub type WebhookId = String;

/// Entity kinds known to the client.
///
/// Used to key per-kind cache policies and to label metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Server,
    Channel,
    Message,
    Doc,
    ForumTopic,
    ForumTopicComment,
    CalendarEvent,
    ListItem,
    Member,
    Ban,
    Role,
    Webhook,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Server,
        EntityKind::Channel,
        EntityKind::Message,
        EntityKind::Doc,
        EntityKind::ForumTopic,
        EntityKind::ForumTopicComment,
        EntityKind::CalendarEvent,
        EntityKind::ListItem,
        EntityKind::Member,
        EntityKind::Ban,
        EntityKind::Role,
        EntityKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Server => "server",
            EntityKind::Channel => "channel",
            EntityKind::Message => "message",
            EntityKind::Doc => "doc",
            EntityKind::ForumTopic => "forum_topic",
            EntityKind::ForumTopicComment => "forum_topic_comment",
            EntityKind::CalendarEvent => "calendar_event",
            EntityKind::ListItem => "list_item",
            EntityKind::Member => "member",
            EntityKind::Ban => "ban",
            EntityKind::Role => "role",
            EntityKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HuginnError::Configuration(format!("unknown entity kind '{s}'")))
    }
}

/// Decode a typed snapshot from a payload.
pub(crate) fn decode<T: DeserializeOwned>(kind: EntityKind, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| HuginnError::Decode(format!("invalid {kind} payload: {e}")))
}

/// Emote attached to a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Emote {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Mentions contained in a piece of content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentions {
    #[serde(default)]
    pub users: Vec<IdRef<String>>,
    #[serde(default)]
    pub channels: Vec<IdRef<String>>,
    #[serde(default)]
    pub roles: Vec<IdRef<u64>>,
    #[serde(default)]
    pub everyone: bool,
    #[serde(default)]
    pub here: bool,
}

/// `{ "id": ... }` reference object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdRef<T> {
    pub id: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_entity_kind_is_configuration_error() {
        let err = "reaction".parse::<EntityKind>().unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }
}
