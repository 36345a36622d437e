//! Calendar events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CalendarEventId, ChannelId, EntityKind, Mentions, ServerId, decode};
use crate::Result;
use crate::manager::{Creatable, Deletable, Listable, Resource, Updatable};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: CalendarEventId,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub rsvp_limit: Option<u32>,
    pub starts_at: DateTime<Utc>,
    /// Length in minutes.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub mentions: Option<Mentions>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub cancellation: Option<Cancellation>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
}

impl CalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }
}

impl Resource for CalendarEvent {
    type Id = CalendarEventId;
    type Scope = ChannelId;
    type Deps = ();

    const KIND: EntityKind = EntityKind::CalendarEvent;
    const SINGULAR: &'static str = "calendarEvent";
    const PLURAL: &'static str = "calendarEvents";

    fn id(&self) -> CalendarEventId {
        self.id
    }

    fn collection_path(channel_id: &ChannelId) -> String {
        format!("/channels/{channel_id}/events")
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
#[serde(rename_all = "camelCase")]
pub struct CalendarEventQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

impl CalendarEventCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            location: None,
            starts_at: None,
            url: None,
            color: None,
            duration: None,
            is_private: None,
        }
    }

    pub fn starts_at(mut self, at: DateTime<Utc>) -> Self {
        self.starts_at = Some(at);
        self
    }

    pub fn duration(mut self, minutes: u32) -> Self {
        self.duration = Some(minutes);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

impl Listable for CalendarEvent {
    type Query = CalendarEventQuery;
}

impl Creatable for CalendarEvent {
    type Create = CalendarEventCreate;
}

impl Updatable for CalendarEvent {
    type Update = CalendarEventUpdate;
}

impl Deletable for CalendarEvent {}
