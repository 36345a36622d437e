//! Client root and builder.
//!
//! A [`Client`] owns the REST handle, the resolved [`ClientOptions`]
//! snapshot, the top-level server and channel managers, the event bus and
//! the synchronization pipeline. Everything else (members, messages, topics,
//! ...) hangs off the per-scope registries those managers carry.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::collector::{Collector, CollectorOptions};
use crate::config::{CachePolicy, ClientOptions, ReconnectConfig};
use crate::events::{Change, Collectable, EventBus, Subscription};
use crate::manager::{EntityManager, ManagerRegistry, Resource};
use crate::models::{
    CalendarEvent, Channel, ChannelDeps, ChannelId, ClientUser, Doc, EntityKind, ForumTopic,
    ForumTopicComment, ForumTopicDeps, ForumTopicId, ListItem, Message, Role, Server, ServerBan,
    ServerDeps, ServerId, ServerMember, Webhook,
};
use crate::rest::{HttpTransport, Rest, RestTransport, RetryConfig, RetryingTransport};
use crate::sync::Pipeline;
use crate::ws::{StreamEvent, WebSocketTransport};
use crate::{HuginnError, Result};

/// Main entry point for creating clients.
pub struct Huginn;

impl Huginn {
    /// Create a new builder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

/// Builder for configuring clients.
pub struct ClientBuilder {
    options: ClientOptions,
    transport: Option<Arc<dyn RestTransport>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            options: ClientOptions::new(""),
            transport: None,
        }
    }

    /// Bot token used for REST and the event stream.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.options.token = token.into();
        self
    }

    /// Start from a complete option snapshot.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Load options from a TOML file (see [`FileConfig`](crate::FileConfig)).
    ///
    /// `None` looks in `~/.huginn/config.toml`.
    #[cfg(feature = "config")]
    pub fn config_file(mut self, path: Option<&std::path::Path>) -> Result<Self> {
        self.options = crate::config::FileConfig::load(path)?.into_options()?;
        Ok(self)
    }

    /// Override the REST base URL.
    pub fn rest_url(mut self, url: impl Into<String>) -> Self {
        self.options.rest_url = url.into();
        self
    }

    /// Override the WebSocket gateway URL.
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.options.ws_url = url.into();
        self
    }

    /// Set the REST request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Set the rate-limit backoff policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.options.retry = retry;
        self
    }

    /// Set the event stream reconnect policy.
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.options.reconnect = reconnect;
        self
    }

    /// Set the per-subscriber event buffer.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    /// Replace the cache policy of a kind.
    pub fn policy(mut self, kind: EntityKind, policy: CachePolicy) -> Self {
        *self.options.policy_mut(kind) = policy;
        self
    }

    /// Whether constructed entities of `kind` are cached (default: true).
    pub fn cache(mut self, kind: EntityKind, enabled: bool) -> Self {
        self.options.policy_mut(kind).cache = enabled;
        self
    }

    /// Cap each manager of `kind` at `max` entries (default: unbounded).
    pub fn max_cache(mut self, kind: EntityKind, max: Option<usize>) -> Self {
        self.options.policy_mut(kind).max = max;
        self
    }

    /// Whether delete events purge (true, default) or tombstone entries.
    pub fn dispose_cached(mut self, kind: EntityKind, enabled: bool) -> Self {
        self.options.policy_mut(kind).dispose = enabled;
        self
    }

    /// Use a custom REST transport instead of HTTPS.
    ///
    /// The transport is still wrapped with rate-limit retry.
    pub fn transport(mut self, transport: Arc<dyn RestTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let options = self.options;
        options.validate()?;

        let inner: Arc<dyn RestTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_options(
                options.token.clone(),
                options.rest_url.clone(),
                options.request_timeout,
            )?),
        };
        let rest = Rest::new(Arc::new(RetryingTransport::new(
            inner,
            options.retry.clone(),
        )));

        let comments: Arc<ManagerRegistry<ForumTopicComment>> = registry(&rest, &options, ())?;
        let channel_deps = ChannelDeps {
            messages: registry(&rest, &options, ())?,
            docs: registry(&rest, &options, ())?,
            topics: registry(
                &rest,
                &options,
                ForumTopicDeps {
                    comments: Arc::clone(&comments),
                },
            )?,
            events: registry(&rest, &options, ())?,
            items: registry(&rest, &options, ())?,
            comments,
        };
        let server_deps = ServerDeps {
            members: registry(&rest, &options, ())?,
            bans: registry(&rest, &options, ())?,
            roles: registry(&rest, &options, ())?,
            webhooks: registry(&rest, &options, ())?,
        };

        let servers = Arc::new(EntityManager::new(
            (),
            rest.clone(),
            options.policy(EntityKind::Server),
            server_deps,
        )?);
        let channels = Arc::new(EntityManager::new(
            (),
            rest.clone(),
            options.policy(EntityKind::Channel),
            channel_deps,
        )?);

        let bus = EventBus::new(options.event_capacity);
        debug!(rest_url = %options.rest_url, "client built");

        Ok(Client {
            state: Arc::new(ClientState {
                options,
                rest,
                servers,
                channels,
                bus,
                user: RwLock::new(None),
            }),
        })
    }
}

/// Per-scope registry for `R` using the kind's configured policy.
fn registry<R: Resource>(
    rest: &Rest,
    options: &ClientOptions,
    deps: R::Deps,
) -> Result<Arc<ManagerRegistry<R>>> {
    Ok(Arc::new(ManagerRegistry::new(
        rest.clone(),
        options.policy(R::KIND),
        deps,
    )?))
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the client and the pipeline.
pub(crate) struct ClientState {
    pub(crate) options: ClientOptions,
    pub(crate) rest: Rest,
    pub(crate) servers: Arc<EntityManager<Server>>,
    pub(crate) channels: Arc<EntityManager<Channel>>,
    pub(crate) bus: EventBus,
    pub(crate) user: RwLock<Option<Arc<ClientUser>>>,
}

impl ClientState {
    pub(crate) fn server_deps(&self) -> &ServerDeps {
        self.servers.deps()
    }

    pub(crate) fn channel_deps(&self) -> &ChannelDeps {
        self.channels.deps()
    }
}

/// A connected (or connectable) platform client.
///
/// Cheap to clone; clones share caches, bus and pipeline.
#[derive(Clone)]
pub struct Client {
    state: Arc<ClientState>,
}

impl Client {
    pub fn options(&self) -> &ClientOptions {
        &self.state.options
    }

    /// Raw REST handle for endpoints without a manager.
    pub fn rest(&self) -> &Rest {
        &self.state.rest
    }

    /// The bot user, once the stream has connected.
    pub fn user(&self) -> Option<Arc<ClientUser>> {
        self.state.user.read().clone()
    }

    pub fn servers(&self) -> &Arc<EntityManager<Server>> {
        &self.state.servers
    }

    pub fn channels(&self) -> &Arc<EntityManager<Channel>> {
        &self.state.channels
    }

    /// Member manager of a server, whether or not the server is cached.
    pub fn members(&self, server_id: &ServerId) -> Result<Arc<EntityManager<ServerMember>>> {
        self.state.server_deps().members.get_or_create(server_id)
    }

    pub fn bans(&self, server_id: &ServerId) -> Result<Arc<EntityManager<ServerBan>>> {
        self.state.server_deps().bans.get_or_create(server_id)
    }

    pub fn roles(&self, server_id: &ServerId) -> Result<Arc<EntityManager<Role>>> {
        self.state.server_deps().roles.get_or_create(server_id)
    }

    pub fn webhooks(&self, server_id: &ServerId) -> Result<Arc<EntityManager<Webhook>>> {
        self.state.server_deps().webhooks.get_or_create(server_id)
    }

    /// Message manager of a channel, whether or not the channel is cached.
    pub fn messages(&self, channel_id: &ChannelId) -> Result<Arc<EntityManager<Message>>> {
        self.state.channel_deps().messages.get_or_create(channel_id)
    }

    pub fn docs(&self, channel_id: &ChannelId) -> Result<Arc<EntityManager<Doc>>> {
        self.state.channel_deps().docs.get_or_create(channel_id)
    }

    pub fn forum_topics(&self, channel_id: &ChannelId) -> Result<Arc<EntityManager<ForumTopic>>> {
        self.state.channel_deps().topics.get_or_create(channel_id)
    }

    pub fn calendar_events(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Arc<EntityManager<CalendarEvent>>> {
        self.state.channel_deps().events.get_or_create(channel_id)
    }

    pub fn list_items(&self, channel_id: &ChannelId) -> Result<Arc<EntityManager<ListItem>>> {
        self.state.channel_deps().items.get_or_create(channel_id)
    }

    pub fn topic_comments(
        &self,
        channel_id: &ChannelId,
        topic_id: ForumTopicId,
    ) -> Result<Arc<EntityManager<ForumTopicComment>>> {
        self.state
            .channel_deps()
            .comments
            .get_or_create(&(channel_id.clone(), topic_id))
    }

    /// Subscribe to normalized events.
    pub fn subscribe(&self) -> Subscription {
        self.state.bus.subscribe()
    }

    /// The synchronization pipeline feeding this client's caches.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::clone(&self.state))
    }

    /// Feed stream events into the pipeline until the stream ends.
    pub async fn run<S>(&self, stream: S)
    where
        S: Stream<Item = StreamEvent>,
    {
        let pipeline = self.pipeline();
        let mut stream = std::pin::pin!(stream);
        while let Some(event) = stream.next().await {
            pipeline.dispatch(event).await;
        }
        debug!("event stream ended");
    }

    /// Open the WebSocket gateway with the configured URL and reconnect policy.
    pub fn connect(&self) -> ReceiverStream<StreamEvent> {
        let options = &self.state.options;
        WebSocketTransport::new(options.token.clone())
            .url(options.ws_url.clone())
            .reconnect(options.reconnect.clone())
            .spawn()
    }

    /// Connect to the gateway and process events until the connection loop
    /// gives up.
    pub async fn login(&self) -> Result<()> {
        info!(url = %self.state.options.ws_url, "connecting to gateway");
        self.run(self.connect()).await;
        Err(HuginnError::Stream(
            "gateway connection loop stopped".to_string(),
        ))
    }

    /// Create a collector for kind `R` fed from this client's events.
    ///
    /// Created entities are offered to the collector; deleted ones are
    /// disposed. The feed stops when the collector ends.
    pub fn collector<R, F>(&self, options: CollectorOptions, filter: F) -> Collector<R>
    where
        R: Collectable,
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        let collector = Collector::new(options, filter);
        self.attach_collector(&collector);
        collector
    }

    /// Collect messages of one channel.
    pub fn message_collector<F>(
        &self,
        channel_id: impl Into<ChannelId>,
        options: CollectorOptions,
        filter: F,
    ) -> Collector<Message>
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        let channel_id = channel_id.into();
        self.collector(options, move |message: &Message| {
            message.channel_id == channel_id && filter(message)
        })
    }

    /// Feed an existing collector (e.g. one with an async filter) from this
    /// client's events.
    pub fn attach_collector<R: Collectable>(&self, collector: &Collector<R>) {
        let mut events = self.state.bus.subscribe();
        let collector = collector.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = collector.wait() => break,
                    event = events.recv() => {
                        let Some(event) = event else {
                            collector.end();
                            break;
                        };
                        match R::change(&event) {
                            Some(Change::Created(entity)) => {
                                collector.collect(Arc::clone(entity)).await;
                            }
                            Some(Change::Deleted { entity, .. }) => {
                                collector.dispose(&entity.id());
                            }
                            _ => {
                                if let Some(id) = R::removed(&event) {
                                    collector.dispose(&id);
                                }
                            }
                        }
                    }
                }
            }
        });
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("servers", &self.state.servers)
            .field("channels", &self.state.channels)
            .field("subscribers", &self.state.bus.subscriber_count())
            .finish()
    }
}
