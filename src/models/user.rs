//! User types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A platform user as embedded in member payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_bot(&self) -> bool {
        self.user_type.as_deref() == Some("bot")
    }
}

/// Abbreviated user as embedded in list and ban payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// The bot user this client is logged in as, from the stream welcome.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUser {
    pub id: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
