//! Server members and bans.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{EntityKind, RoleId, ServerId, User, UserId, UserSummary, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, EntityManager, Listable, Resource};
use crate::rest::Method;

/// Membership of a user in a server. Keyed by user id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMember {
    #[serde(skip)]
    pub server_id: ServerId,
    pub user: User,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_owner: bool,
    /// Set when the member left or was removed and the snapshot is kept as a
    /// tombstone.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ServerMember {
    /// Nickname if set, otherwise the user name.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.user.name)
    }
}

impl Resource for ServerMember {
    type Id = UserId;
    type Scope = ServerId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::Member;
    const SINGULAR: &'static str = "member";
    const PLURAL: &'static str = "members";

    fn id(&self) -> UserId {
        self.user.id.clone()
    }

    fn collection_path(server_id: &ServerId) -> String {
        format!("/servers/{server_id}/members")
    }

    fn from_payload(server_id: &ServerId, _: &(), payload: Value) -> Result<Self> {
        let mut member: Self = decode(Self::KIND, payload)?;
        member.server_id = server_id.clone();
        Ok(member)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

impl Listable for ServerMember {
    type Query = ();
}

/// Deleting a member kicks them from the server.
impl Deletable for ServerMember {}

impl EntityManager<ServerMember> {
    /// Kick a member. Alias of [`delete`](EntityManager::delete).
    pub async fn kick(&self, user_id: &UserId) -> Result<Option<Arc<ServerMember>>> {
        self.delete(user_id).await
    }

    /// Set or clear a member's nickname.
    ///
    /// The cached snapshot, if any, is replaced with one carrying the new
    /// nickname and returned.
    pub async fn set_nickname(
        &self,
        user_id: &UserId,
        nickname: Option<&str>,
    ) -> Result<Option<Arc<ServerMember>>> {
        let path = format!("{}/nickname", ServerMember::item_path(self.scope(), user_id));
        match nickname {
            Some(nickname) => {
                self.rest()
                    .send(Method::Put, path, &json!({ "nickname": nickname }))
                    .await?;
            }
            None => self.touch(Method::Delete, path).await?,
        }
        Ok(self.patch_cached(user_id, |member| {
            member.nickname = nickname.map(str::to_string);
        }))
    }

    /// Assign a role to a member.
    pub async fn add_role(
        &self,
        user_id: &UserId,
        role_id: RoleId,
    ) -> Result<Option<Arc<ServerMember>>> {
        self.touch(Method::Put, role_path(self.scope(), user_id, role_id))
            .await?;
        Ok(self.patch_cached(user_id, |member| {
            if !member.role_ids.contains(&role_id) {
                member.role_ids.push(role_id);
            }
        }))
    }

    /// Remove a role from a member.
    pub async fn remove_role(
        &self,
        user_id: &UserId,
        role_id: RoleId,
    ) -> Result<Option<Arc<ServerMember>>> {
        self.touch(Method::Delete, role_path(self.scope(), user_id, role_id))
            .await?;
        Ok(self.patch_cached(user_id, |member| {
            member.role_ids.retain(|r| *r != role_id);
        }))
    }
}

fn role_path(server_id: &ServerId, user_id: &UserId, role_id: RoleId) -> String {
    format!("/servers/{server_id}/members/{user_id}/roles/{role_id}")
}

/// A ban of a user from a server. Keyed by the banned user's id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBan {
    #[serde(skip)]
    pub server_id: ServerId,
    pub user: UserSummary,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Set when the ban was lifted and the snapshot is kept as a tombstone.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource for ServerBan {
    type Id = UserId;
    type Scope = ServerId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::Ban;
    const SINGULAR: &'static str = "serverMemberBan";
    const PLURAL: &'static str = "serverMemberBans";

    fn id(&self) -> UserId {
        self.user.id.clone()
    }

    fn collection_path(server_id: &ServerId) -> String {
        format!("/servers/{server_id}/bans")
    }

    fn from_payload(server_id: &ServerId, _: &(), payload: Value) -> Result<Self> {
        let mut ban: Self = decode(Self::KIND, payload)?;
        ban.server_id = server_id.clone();
        Ok(ban)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

/// Payload for banning a user.
#[derive(Debug, Clone, Serialize)]
pub struct BanCreate {
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BanCreate {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            reason: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl Listable for ServerBan {
    type Query = ();
}

impl Creatable for ServerBan {
    type Create = BanCreate;

    fn create_path(server_id: &ServerId, payload: &BanCreate) -> String {
        Self::item_path(server_id, &payload.user_id)
    }
}

/// Deleting a ban unbans the user.
impl Deletable for ServerBan {}
