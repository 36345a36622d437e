//! Docs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChannelId, DocId, EntityKind, Mentions, ServerId, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, Listable, Resource, Updatable};
use crate::rest::Method;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doc {
    pub id: DocId,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub mentions: Option<Mentions>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource for Doc {
    type Id = DocId;
    type Scope = ChannelId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::Doc;
    const SINGULAR: &'static str = "doc";
    const PLURAL: &'static str = "docs";

    fn id(&self) -> DocId {
        self.id
    }

    fn collection_path(channel_id: &ChannelId) -> String {
        format!("/channels/{channel_id}/docs")
    }

    fn from_payload(_: &ChannelId, _: &(), payload: Value) -> Result<Self> {
        decode(Self::KIND, payload)
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocCreate {
    pub title: String,
    pub content: String,
}

impl DocCreate {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Docs are replaced wholesale; both fields are required.
pub type DocUpdate = DocCreate;

impl Listable for Doc {
    type Query = DocQuery;
}

impl Creatable for Doc {
    type Create = DocCreate;
}

impl Updatable for Doc {
    type Update = DocUpdate;

    const UPDATE_METHOD: Method = Method::Put;
}

impl Deletable for Doc {}
