//! Synchronization pipeline.
//!
//! Turns inbound stream events into cache mutations and exactly one
//! normalized [`Event`] each. Per event:
//!
//! 1. look the event name up in the route table (unknown names are dropped);
//! 2. resolve the owner chain through fetch-or-cache: the server for
//!    server-scoped kinds, the channel for channel content, and the forum
//!    topic for comments;
//! 3. build the entity through its manager, overwriting any cached snapshot;
//! 4. for deletes, stamp the delete marker and dispose or tombstone per the
//!    kind's policy, tearing down child managers of disposed owners;
//! 5. publish the event with the previous snapshot, if one was cached.
//!
//! Events start in arrival order. A handler whose owners are all cached
//! completes inline, so such events also finish in order. A handler that has
//! to wait on a REST fetch continues on its own task, and later events do not
//! wait for it: two events under the same uncached parent may both fetch it,
//! and the last response to arrive is the one left in the cache.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::client::ClientState;
use crate::events::{Change, Event, MemberRolesUpdate};
use crate::manager::{EntityManager, FetchOptions, Resource};
use crate::models::{
    Channel, ChannelId, ClientUser, EntityKind, ForumTopicId, Reaction, RoleId, Server, ServerId,
    UserId,
};
use crate::telemetry;
use crate::ws::StreamEvent;
use crate::{HuginnError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Create,
    Update,
    Delete,
}

/// Handler selected by an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Message(Op),
    Channel(Op),
    Doc(Op),
    ForumTopic(Op),
    ForumTopicComment(Op),
    CalendarEvent(Op),
    ListItem(Op),
    MemberJoined,
    MemberUpdated,
    MemberRemoved,
    MemberRolesUpdated,
    Ban(Op),
    Role(Op),
    Webhook(Op),
    Reaction { added: bool },
    BotMembership(Op),
}

/// Event name → handler.
const ROUTES: &[(&str, Route)] = &[
    ("ChatMessageCreated", Route::Message(Op::Create)),
    ("ChatMessageUpdated", Route::Message(Op::Update)),
    ("ChatMessageDeleted", Route::Message(Op::Delete)),
    ("ServerChannelCreated", Route::Channel(Op::Create)),
    ("ServerChannelUpdated", Route::Channel(Op::Update)),
    ("ServerChannelDeleted", Route::Channel(Op::Delete)),
    ("DocCreated", Route::Doc(Op::Create)),
    ("DocUpdated", Route::Doc(Op::Update)),
    ("DocDeleted", Route::Doc(Op::Delete)),
    ("ForumTopicCreated", Route::ForumTopic(Op::Create)),
    ("ForumTopicUpdated", Route::ForumTopic(Op::Update)),
    ("ForumTopicDeleted", Route::ForumTopic(Op::Delete)),
    ("ForumTopicPinned", Route::ForumTopic(Op::Update)),
    ("ForumTopicUnpinned", Route::ForumTopic(Op::Update)),
    ("ForumTopicLocked", Route::ForumTopic(Op::Update)),
    ("ForumTopicUnlocked", Route::ForumTopic(Op::Update)),
    ("ForumTopicCommentCreated", Route::ForumTopicComment(Op::Create)),
    ("ForumTopicCommentUpdated", Route::ForumTopicComment(Op::Update)),
    ("ForumTopicCommentDeleted", Route::ForumTopicComment(Op::Delete)),
    ("CalendarEventCreated", Route::CalendarEvent(Op::Create)),
    ("CalendarEventUpdated", Route::CalendarEvent(Op::Update)),
    ("CalendarEventDeleted", Route::CalendarEvent(Op::Delete)),
    ("ListItemCreated", Route::ListItem(Op::Create)),
    ("ListItemUpdated", Route::ListItem(Op::Update)),
    ("ListItemDeleted", Route::ListItem(Op::Delete)),
    ("ListItemCompleted", Route::ListItem(Op::Update)),
    ("ListItemUncompleted", Route::ListItem(Op::Update)),
    ("ServerMemberJoined", Route::MemberJoined),
    ("ServerMemberUpdated", Route::MemberUpdated),
    ("ServerMemberRemoved", Route::MemberRemoved),
    ("ServerRolesUpdated", Route::MemberRolesUpdated),
    ("ServerMemberBanned", Route::Ban(Op::Create)),
    ("ServerMemberUnbanned", Route::Ban(Op::Delete)),
    ("ServerWebhookCreated", Route::Webhook(Op::Create)),
    ("ServerWebhookUpdated", Route::Webhook(Op::Update)),
    ("RoleCreated", Route::Role(Op::Create)),
    ("RoleUpdated", Route::Role(Op::Update)),
    ("RoleDeleted", Route::Role(Op::Delete)),
    ("ChannelMessageReactionCreated", Route::Reaction { added: true }),
    ("ChannelMessageReactionDeleted", Route::Reaction { added: false }),
    ("BotServerMembershipCreated", Route::BotMembership(Op::Create)),
    ("BotServerMembershipDeleted", Route::BotMembership(Op::Delete)),
];

fn route(name: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, route)| *route)
}

/// Whether the pipeline has a handler for `name`.
pub fn is_handled(name: &str) -> bool {
    route(name).is_some()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRoleIds {
    user_id: UserId,
    #[serde(default)]
    role_ids: Vec<RoleId>,
}

/// Applies stream events to a client's caches.
#[derive(Clone)]
pub struct Pipeline {
    state: Arc<ClientState>,
}

impl Pipeline {
    pub(crate) fn new(state: Arc<ClientState>) -> Self {
        Self { state }
    }

    /// Start processing one stream event.
    ///
    /// Returns once the event is fully applied, unless its handler has to
    /// wait on the network; that remainder runs on a spawned task. Failures
    /// are logged and counted, never returned.
    pub async fn dispatch(&self, event: StreamEvent) {
        match event {
            StreamEvent::Connected(welcome) => self.ready(welcome),
            StreamEvent::Disconnected { reason } => {
                debug!(%reason, "stream disconnected");
                self.state.bus.publish(Event::Disconnected);
            }
            StreamEvent::Data { kind, payload } => {
                if !is_handled(&kind) {
                    trace!(event = %kind, "dropping unhandled event");
                    metrics::counter!(telemetry::EVENTS_UNKNOWN_TOTAL).increment(1);
                    return;
                }
                let mut task = Box::pin(self.clone().process(kind, payload));
                if futures_util::poll!(&mut task).is_pending() {
                    tokio::spawn(task);
                }
            }
        }
    }

    async fn process(self, name: String, payload: Value) {
        let status = match self.handle(&name, payload).await {
            Ok(_) => "ok",
            Err(e) => {
                warn!(event = %name, error = %e, "failed to apply event");
                "error"
            }
        };
        metrics::counter!(telemetry::EVENTS_TOTAL, "event" => name, "status" => status)
            .increment(1);
    }

    /// Apply one event and publish its normalized form.
    ///
    /// Returns the published event, or `None` for an unhandled name. On
    /// error nothing is published.
    pub async fn handle(&self, name: &str, payload: Value) -> Result<Option<Event>> {
        let Some(route) = route(name) else {
            return Ok(None);
        };
        let event = self.apply(route, payload).await?;
        self.state.bus.publish(event.clone());
        Ok(Some(event))
    }

    async fn apply(&self, route: Route, mut payload: Value) -> Result<Event> {
        match route {
            Route::Message(op) => {
                let message = take(&mut payload, "message")?;
                let channel_id: ChannelId = field(&message, "/channelId")?;
                let manager = self
                    .content(&channel_id, Channel::messages, "chat")
                    .await?;
                Ok(Event::Message(change(&manager, op, message, "/id")?))
            }
            Route::Channel(op) => {
                let channel = take(&mut payload, "channel")?;
                let channels = &self.state.channels;
                let change = change(channels, op, channel, "/id")?;
                if let Change::Deleted { entity, .. } = &change
                    && channels.policy().dispose
                {
                    self.state.channel_deps().teardown(&entity.id());
                }
                Ok(Event::Channel(change))
            }
            Route::Doc(op) => {
                let doc = take(&mut payload, "doc")?;
                let channel_id: ChannelId = field(&doc, "/channelId")?;
                let manager = self.content(&channel_id, Channel::docs, "docs").await?;
                Ok(Event::Doc(change(&manager, op, doc, "/id")?))
            }
            Route::ForumTopic(op) => {
                let topic = take(&mut payload, "forumTopic")?;
                let channel_id: ChannelId = field(&topic, "/channelId")?;
                let manager = self
                    .content(&channel_id, Channel::topics, "forum")
                    .await?;
                let change = change(&manager, op, topic, "/id")?;
                if let Change::Deleted { entity, .. } = &change
                    && manager.policy().dispose
                {
                    manager.deps().teardown(&channel_id, entity.id);
                }
                Ok(Event::ForumTopic(change))
            }
            Route::ForumTopicComment(op) => {
                let comment = take(&mut payload, "forumTopicComment")?;
                let channel_id: ChannelId = field(&comment, "/channelId")?;
                let topic_id: ForumTopicId = field(&comment, "/forumTopicId")?;
                let topics = self
                    .content(&channel_id, Channel::topics, "forum")
                    .await?;
                let topic = topics.fetch(&topic_id, FetchOptions::default()).await?;
                Ok(Event::ForumTopicComment(change(
                    topic.comments(),
                    op,
                    comment,
                    "/id",
                )?))
            }
            Route::CalendarEvent(op) => {
                let event = take(&mut payload, "calendarEvent")?;
                let channel_id: ChannelId = field(&event, "/channelId")?;
                let manager = self
                    .content(&channel_id, Channel::calendar_events, "calendar")
                    .await?;
                Ok(Event::CalendarEvent(change(&manager, op, event, "/id")?))
            }
            Route::ListItem(op) => {
                let item = take(&mut payload, "listItem")?;
                let channel_id: ChannelId = field(&item, "/channelId")?;
                let manager = self
                    .content(&channel_id, Channel::list_items, "list")
                    .await?;
                Ok(Event::ListItem(change(&manager, op, item, "/id")?))
            }
            Route::MemberJoined => {
                let server = self.server(&payload).await?;
                let member = take(&mut payload, "member")?;
                Ok(Event::Member(change(
                    server.members(),
                    Op::Create,
                    member,
                    "/user/id",
                )?))
            }
            Route::MemberUpdated => {
                let server = self.server(&payload).await?;
                let info = take(&mut payload, "userInfo")?;
                let user_id: UserId = field(&info, "/id")?;
                let nickname = info
                    .get("nickname")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                let members = server.members();
                let old = members.get(&user_id);
                let new = match members.patch_cached(&user_id, |member| member.nickname = nickname)
                {
                    Some(new) => new,
                    None => members.fetch(&user_id, FetchOptions::default()).await?,
                };
                Ok(Event::Member(Change::Updated { old, new }))
            }
            Route::MemberRemoved => {
                let server = self.server(&payload).await?;
                let user_id: UserId = field(&payload, "/userId")?;
                let flag = |key: &str| payload.get(key).and_then(Value::as_bool).unwrap_or(false);
                let member = server
                    .members()
                    .discard_id(&user_id)
                    .map(|(_, tombstone)| tombstone);
                Ok(Event::MemberRemoved {
                    server_id: server.id.clone(),
                    kicked: flag("isKick"),
                    banned: flag("isBan"),
                    user_id,
                    member,
                })
            }
            Route::MemberRolesUpdated => {
                let server = self.server(&payload).await?;
                let entries: Vec<MemberRoleIds> =
                    decode_field(take(&mut payload, "memberRoleIds")?)?;
                let members = server.members();
                let updates = entries
                    .into_iter()
                    .map(|entry| {
                        let old = members.get(&entry.user_id);
                        let role_ids = entry.role_ids;
                        let new = members.patch_cached(&entry.user_id, |member| {
                            member.role_ids = role_ids.clone();
                        });
                        MemberRolesUpdate {
                            user_id: entry.user_id,
                            role_ids,
                            old,
                            new,
                        }
                    })
                    .collect();
                Ok(Event::MemberRolesUpdated {
                    server_id: server.id.clone(),
                    updates,
                })
            }
            Route::Ban(op) => {
                let server = self.server(&payload).await?;
                let ban = take(&mut payload, "serverMemberBan")?;
                Ok(Event::Ban(change(server.bans(), op, ban, "/user/id")?))
            }
            Route::Role(op) => {
                let server = self.server(&payload).await?;
                let role = take(&mut payload, "role")?;
                Ok(Event::Role(change(server.roles(), op, role, "/id")?))
            }
            Route::Webhook(op) => {
                let server = self.server(&payload).await?;
                let webhook = take(&mut payload, "webhook")?;
                Ok(Event::Webhook(change(server.webhooks(), op, webhook, "/id")?))
            }
            Route::Reaction { added } => {
                let reaction: Reaction = decode_field(take(&mut payload, "reaction")?)?;
                let channel = self.channel(&reaction.channel_id).await?;
                let message = channel
                    .messages()
                    .and_then(|messages| messages.get(&reaction.message_id));
                Ok(Event::Reaction {
                    added,
                    reaction,
                    message,
                })
            }
            Route::BotMembership(op) => {
                let server = take(&mut payload, "server")?;
                let servers = &self.state.servers;
                let change = change(servers, op, server, "/id")?;
                if let Change::Deleted { entity, .. } = &change
                    && servers.policy().dispose
                {
                    self.teardown_server(&entity.id);
                }
                Ok(Event::Server(change))
            }
        }
    }

    /// Store the bot user from the welcome payload and announce readiness.
    fn ready(&self, welcome: Value) {
        let user = welcome
            .get("user")
            .cloned()
            .ok_or_else(|| HuginnError::Decode("welcome payload missing 'user'".into()))
            .and_then(|user| decode_field::<ClientUser>(user));
        match user {
            Ok(user) => {
                let user = Arc::new(user);
                *self.state.user.write() = Some(Arc::clone(&user));
                debug!(user = %user.name, "ready");
                self.state.bus.publish(Event::Ready(user));
            }
            Err(e) => warn!(error = %e, "ignoring malformed welcome payload"),
        }
    }

    async fn server(&self, payload: &Value) -> Result<Arc<Server>> {
        let server_id: ServerId = field(payload, "/serverId")?;
        self.state
            .servers
            .fetch(&server_id, FetchOptions::default())
            .await
    }

    async fn channel(&self, channel_id: &ChannelId) -> Result<Arc<Channel>> {
        self.state
            .channels
            .fetch(channel_id, FetchOptions::default())
            .await
    }

    /// Resolve a channel and pick its content manager.
    async fn content<R: Resource>(
        &self,
        channel_id: &ChannelId,
        pick: fn(&Channel) -> Option<&Arc<EntityManager<R>>>,
        expected: &str,
    ) -> Result<Arc<EntityManager<R>>> {
        let channel = self.channel(channel_id).await?;
        pick(channel.as_ref()).cloned().ok_or_else(|| {
            HuginnError::Resolution(format!(
                "{} event for channel {channel_id}, which is not a {expected} channel ({:?})",
                R::KIND,
                channel.channel_type()
            ))
        })
    }

    /// Drop a disposed server's child managers and its cached channels.
    fn teardown_server(&self, server_id: &ServerId) {
        self.state.server_deps().teardown(server_id);
        let channels = &self.state.channels;
        for channel in channels.cached() {
            if channel.server_id() == server_id {
                let channel_id = channel.id();
                channels.evict(&channel_id);
                self.state.channel_deps().teardown(&channel_id);
            }
        }
        debug!(kind = %EntityKind::Server, %server_id, "tore down server");
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

/// Apply a create, update or delete to `manager`.
///
/// `id_pointer` locates the entity id in the payload; deletes need it to
/// find the cached snapshot when the payload is too sparse to decode.
fn change<R>(
    manager: &EntityManager<R>,
    op: Op,
    payload: Value,
    id_pointer: &str,
) -> Result<Change<R>>
where
    R: Resource,
    R::Id: DeserializeOwned,
{
    Ok(match op {
        Op::Create => {
            let (_, new) = manager.upsert(payload)?;
            Change::Created(new)
        }
        Op::Update => {
            let (old, new) = manager.upsert(payload)?;
            Change::Updated { old, new }
        }
        Op::Delete => {
            let id: R::Id = field(&payload, id_pointer)?;
            let (old, entity) = manager.discard(&id, payload)?;
            Change::Deleted { old, entity }
        }
    })
}

/// Remove and return `payload[key]`.
fn take(payload: &mut Value, key: &str) -> Result<Value> {
    payload
        .get_mut(key)
        .map(Value::take)
        .filter(|value| !value.is_null())
        .ok_or_else(|| HuginnError::Decode(format!("event payload missing '{key}'")))
}

/// Decode the value at a JSON pointer.
fn field<T: DeserializeOwned>(payload: &Value, pointer: &str) -> Result<T> {
    let value = payload
        .pointer(pointer)
        .ok_or_else(|| HuginnError::Decode(format!("event payload missing '{pointer}'")))?;
    T::deserialize(value).map_err(|e| HuginnError::Decode(format!("invalid '{pointer}': {e}")))
}

fn decode_field<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| HuginnError::Decode(e.to_string()))
}
