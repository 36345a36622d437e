//! Server roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityKind, RoleId, ServerId, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, Listable, Resource, Updatable};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub server_id: ServerId,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub colors: Vec<u32>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub is_base: bool,
    #[serde(default)]
    pub is_displayed_separately: bool,
    #[serde(default)]
    pub is_self_assignable: bool,
    #[serde(default)]
    pub is_mentionable: bool,
    #[serde(default)]
    pub bot_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource for Role {
    type Id = RoleId;
    type Scope = ServerId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::Role;
    const SINGULAR: &'static str = "role";
    const PLURAL: &'static str = "roles";

    fn id(&self) -> RoleId {
        self.id
    }

    fn collection_path(server_id: &ServerId) -> String {
        format!("/servers/{server_id}/roles")
    }

    fn from_payload(_: &ServerId, _: &(), payload: Value) -> Result<Self> {
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
#[serde(rename_all = "camelCase")]
pub struct RoleCreate {
    pub name: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_displayed_separately: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_self_assignable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mentionable: Option<bool>,
}

impl RoleCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            colors: Vec::new(),
            is_displayed_separately: None,
            is_self_assignable: None,
            is_mentionable: None,
        }
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_displayed_separately: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_self_assignable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mentionable: Option<bool>,
}

impl Listable for Role {
    type Query = ();
}

impl Creatable for Role {
    type Create = RoleCreate;
}

impl Updatable for Role {
    type Update = RoleUpdate;
}

impl Deletable for Role {}
