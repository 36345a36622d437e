//! List items.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChannelId, EntityKind, ListItemId, Mentions, ServerId, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, EntityManager, Listable, Resource, Updatable};
use crate::rest::Method;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: ListItemId,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub message: String,
    #[serde(default)]
    pub mentions: Option<Mentions>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub created_by_webhook_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub parent_list_item_id: Option<ListItemId>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub note: Option<ListItemNote>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ListItem {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItemNote {
    pub content: String,
}

impl Resource for ListItem {
    type Id = ListItemId;
    type Scope = ChannelId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::ListItem;
    const SINGULAR: &'static str = "listItem";
    const PLURAL: &'static str = "listItems";

    fn id(&self) -> ListItemId {
        self.id.clone()
    }

    fn collection_path(channel_id: &ChannelId) -> String {
        format!("/channels/{channel_id}/items")
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

#[derive(Debug, Clone, Serialize)]
pub struct ListItemCreate {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<ListItemNote>,
}

impl ListItemCreate {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            note: None,
        }
    }

    pub fn note(mut self, content: impl Into<String>) -> Self {
        self.note = Some(ListItemNote {
            content: content.into(),
        });
        self
    }
}

pub type ListItemUpdate = ListItemCreate;

impl Listable for ListItem {
    type Query = ();
}

impl Creatable for ListItem {
    type Create = ListItemCreate;
}

impl Updatable for ListItem {
    type Update = ListItemUpdate;

    const UPDATE_METHOD: Method = Method::Put;
}

impl Deletable for ListItem {}

impl EntityManager<ListItem> {
    /// Mark an item complete.
    ///
    /// The response carries no item; the cached snapshot (if any) is stamped
    /// locally and the authoritative values arrive with the completion event.
    pub async fn complete(&self, item_id: &ListItemId) -> Result<Option<Arc<ListItem>>> {
        self.touch(Method::Post, complete_path(self.scope(), item_id))
            .await?;
        Ok(self.patch_cached(item_id, |item| item.completed_at = Some(Utc::now())))
    }

    pub async fn uncomplete(&self, item_id: &ListItemId) -> Result<Option<Arc<ListItem>>> {
        self.touch(Method::Delete, complete_path(self.scope(), item_id))
            .await?;
        Ok(self.patch_cached(item_id, |item| {
            item.completed_at = None;
            item.completed_by = None;
        }))
    }
}

fn complete_path(channel_id: &ChannelId, item_id: &ListItemId) -> String {
    format!("/channels/{channel_id}/items/{item_id}/complete")
}
