//! Normalized application events.
//!
//! The pipeline publishes exactly one [`Event`] per processed stream event on
//! the client's [`EventBus`]. Application code and collectors subscribe to
//! the bus; nothing is global.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::models::{
    CalendarEvent, Channel, ClientUser, Doc, ForumTopic, ForumTopicComment, ListItem, Message,
    Reaction, Role, RoleId, Server, ServerBan, ServerId, ServerMember, UserId, Webhook,
};

/// A cache change for one entity kind.
#[derive(Debug, Clone)]
pub enum Change<T> {
    Created(Arc<T>),
    /// `old` is the snapshot that was cached before the update, if any.
    Updated { old: Option<Arc<T>>, new: Arc<T> },
    /// `entity` carries the delete marker. `old` is the snapshot that was
    /// cached before the delete, if any.
    Deleted { old: Option<Arc<T>>, entity: Arc<T> },
}

impl<T> Change<T> {
    /// The entity after the change.
    pub fn entity(&self) -> &Arc<T> {
        match self {
            Change::Created(entity) => entity,
            Change::Updated { new, .. } => new,
            Change::Deleted { entity, .. } => entity,
        }
    }

    /// The previously cached snapshot, if any.
    pub fn old(&self) -> Option<&Arc<T>> {
        match self {
            Change::Created(_) => None,
            Change::Updated { old, .. } | Change::Deleted { old, .. } => old.as_ref(),
        }
    }
}

/// Role assignment change of one member.
#[derive(Debug, Clone)]
pub struct MemberRolesUpdate {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
    /// Cached member before the change.
    pub old: Option<Arc<ServerMember>>,
    /// Cached member after the change. `None` when the member was not cached.
    pub new: Option<Arc<ServerMember>>,
}

/// Events published by the client.
#[derive(Debug, Clone)]
pub enum Event {
    /// The stream connected and identified the bot user.
    Ready(Arc<ClientUser>),
    /// The stream dropped. The transport reconnects on its own.
    Disconnected,
    Server(Change<Server>),
    Channel(Change<Channel>),
    Message(Change<Message>),
    Doc(Change<Doc>),
    ForumTopic(Change<ForumTopic>),
    ForumTopicComment(Change<ForumTopicComment>),
    CalendarEvent(Change<CalendarEvent>),
    ListItem(Change<ListItem>),
    Member(Change<ServerMember>),
    /// A member left, was kicked or was banned.
    MemberRemoved {
        server_id: ServerId,
        user_id: UserId,
        /// Tombstoned snapshot if the member was cached.
        member: Option<Arc<ServerMember>>,
        kicked: bool,
        banned: bool,
    },
    MemberRolesUpdated {
        server_id: ServerId,
        updates: Vec<MemberRolesUpdate>,
    },
    Ban(Change<ServerBan>),
    Role(Change<Role>),
    Webhook(Change<Webhook>),
    Reaction {
        added: bool,
        reaction: Reaction,
        /// The reacted-to message if it is cached.
        message: Option<Arc<Message>>,
    },
}

/// Entity kinds whose changes can be picked out of an [`Event`].
pub trait Collectable: crate::manager::Resource {
    fn change(event: &Event) -> Option<&Change<Self>>;

    /// Id of an entity removed by an event that is not a [`Change`].
    fn removed(_event: &Event) -> Option<Self::Id> {
        None
    }
}

macro_rules! collectable {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Collectable for $ty {
                fn change(event: &Event) -> Option<&Change<Self>> {
                    match event {
                        Event::$variant(change) => Some(change),
                        _ => None,
                    }
                }
            }
        )*
    };
}

collectable! {
    Server => Server,
    Channel => Channel,
    Message => Message,
    Doc => Doc,
    ForumTopic => ForumTopic,
    ForumTopicComment => ForumTopicComment,
    CalendarEvent => CalendarEvent,
    ListItem => ListItem,
    ServerBan => Ban,
    Role => Role,
    Webhook => Webhook,
}

impl Collectable for ServerMember {
    fn change(event: &Event) -> Option<&Change<Self>> {
        match event {
            Event::Member(change) => Some(change),
            _ => None,
        }
    }

    fn removed(event: &Event) -> Option<UserId> {
        match event {
            Event::MemberRemoved { user_id, .. } => Some(user_id.clone()),
            _ => None,
        }
    }
}

/// Typed publish/subscribe for [`Event`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// Emission is best-effort; with no subscribers the event is dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving end of an [`EventBus`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips the overwritten events.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fans_out_to_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(Event::Disconnected);

        assert!(matches!(a.recv().await, Some(Event::Disconnected)));
        assert!(matches!(b.recv().await, Some(Event::Disconnected)));
    }

    #[tokio::test]
    async fn closed_bus_ends_subscription() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn lagging_subscriber_skips_to_retained_events() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for _ in 0..3 {
            bus.publish(Event::Disconnected);
        }
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.publish(Event::Disconnected);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
