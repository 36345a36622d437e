//! Servers and their child managers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{EntityKind, Role, ServerBan, ServerId, ServerMember, Webhook, decode};
use crate::Result;
use crate::manager::{EntityManager, ManagerRegistry, Resource};

/// Registries for the per-server managers.
#[derive(Clone, Debug)]
pub struct ServerDeps {
    pub(crate) members: Arc<ManagerRegistry<ServerMember>>,
    pub(crate) bans: Arc<ManagerRegistry<ServerBan>>,
    pub(crate) roles: Arc<ManagerRegistry<Role>>,
    pub(crate) webhooks: Arc<ManagerRegistry<Webhook>>,
}

impl ServerDeps {
    /// Drop every child manager of a discarded server.
    pub(crate) fn teardown(&self, server_id: &ServerId) {
        self.members.remove(server_id);
        self.bans.remove(server_id);
        self.roles.remove(server_id);
        self.webhooks.remove(server_id);
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerData {
    id: ServerId,
    owner_id: String,
    #[serde(rename = "type", default)]
    server_type: Option<String>,
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    banner: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    is_verified: bool,
    #[serde(default)]
    default_channel_id: Option<String>,
    created_at: DateTime<Utc>,
}

/// A server (guild).
///
/// Owns the member, ban, role and webhook managers for this server.
#[derive(Debug, Clone)]
pub struct Server {
    pub id: ServerId,
    pub owner_id: String,
    pub server_type: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub timezone: Option<String>,
    pub is_verified: bool,
    pub default_channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the bot was removed from the server and the snapshot is
    /// retained as a tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
    members: Arc<EntityManager<ServerMember>>,
    bans: Arc<EntityManager<ServerBan>>,
    roles: Arc<EntityManager<Role>>,
    webhooks: Arc<EntityManager<Webhook>>,
}

impl Server {
    pub fn members(&self) -> &Arc<EntityManager<ServerMember>> {
        &self.members
    }

    pub fn bans(&self) -> &Arc<EntityManager<ServerBan>> {
        &self.bans
    }

    pub fn roles(&self) -> &Arc<EntityManager<Role>> {
        &self.roles
    }

    pub fn webhooks(&self) -> &Arc<EntityManager<Webhook>> {
        &self.webhooks
    }
}

impl Resource for Server {
    type Id = ServerId;
    type Scope = ();
    type Deps = ServerDeps;

    const KIND: EntityKind = EntityKind::Server;
    const SINGULAR: &'static str = "server";
    const PLURAL: &'static str = "servers";

    fn id(&self) -> ServerId {
        self.id.clone()
    }

    fn collection_path(_: &()) -> String {
        "/servers".to_string()
    }

    fn from_payload(_: &(), deps: &ServerDeps, payload: Value) -> Result<Self> {
        let data: ServerData = decode(Self::KIND, payload)?;
        Ok(Self {
            members: deps.members.get_or_create(&data.id)?,
            bans: deps.bans.get_or_create(&data.id)?,
            roles: deps.roles.get_or_create(&data.id)?,
            webhooks: deps.webhooks.get_or_create(&data.id)?,
            id: data.id,
            owner_id: data.owner_id,
            server_type: data.server_type,
            name: data.name,
            url: data.url,
            about: data.about,
            avatar: data.avatar,
            banner: data.banner,
            timezone: data.timezone,
            is_verified: data.is_verified,
            default_channel_id: data.default_channel_id,
            created_at: data.created_at,
            deleted_at: None,
        })
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}
