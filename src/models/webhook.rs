//! Server webhooks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChannelId, EntityKind, ServerId, WebhookId, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, Listable, Resource, Updatable};
use crate::rest::Method;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: WebhookId,
    pub name: String,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub avatar: Option<String>,
    /// Only present in the creation response.
    #[serde(default)]
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource for Webhook {
    type Id = WebhookId;
    type Scope = ServerId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::Webhook;
    const SINGULAR: &'static str = "webhook";
    const PLURAL: &'static str = "webhooks";

    fn id(&self) -> WebhookId {
        self.id.clone()
    }

    fn collection_path(server_id: &ServerId) -> String {
        format!("/servers/{server_id}/webhooks")
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
pub struct WebhookCreate {
    pub name: String,
    pub channel_id: ChannelId,
}

impl WebhookCreate {
    pub fn new(name: impl Into<String>, channel_id: impl Into<ChannelId>) -> Self {
        Self {
            name: name.into(),
            channel_id: channel_id.into(),
        }
    }
}

pub type WebhookUpdate = WebhookCreate;

impl Listable for Webhook {
    type Query = ();
}

impl Creatable for Webhook {
    type Create = WebhookCreate;
}

impl Updatable for Webhook {
    type Update = WebhookUpdate;

    const UPDATE_METHOD: Method = Method::Put;
}

impl Deletable for Webhook {}
