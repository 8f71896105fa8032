//! Server-derived entities as they arrive over REST and the push channel.
//!
//! Field names are camelCase on the wire. Timestamps are held as epoch
//! milliseconds; the server may send either a number or an RFC 3339 string.

use serde::{Deserialize, Serialize};

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl UserSummary {
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            avatar: None,
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub sender_id: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: i64,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub participants: Vec<UserSummary>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(with = "timestamp")]
    pub updated_at: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default = "default_true")]
    pub read: bool,
}

impl Conversation {
    /// Most recent activity, used to order chat lists.
    pub fn activity_at(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|m| m.created_at.max(self.updated_at))
            .unwrap_or(self.updated_at)
    }

    pub fn participant(&self, user_id: &str) -> Option<&UserSummary> {
        self.participants.iter().find(|p| p.id == user_id)
    }
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Seen,
    Failed,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Sent
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(with = "timestamp")]
    pub created_at: i64,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub edited: bool,
    /// Local-only: why a provisional send failed.
    #[serde(skip)]
    pub failure_reason: Option<String>,
}

impl Message {
    pub fn summary(&self) -> LastMessage {
        LastMessage {
            sender_id: self.sender_id.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }

    /// Provisional messages carry a client-generated id until the server echoes them.
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub actor: Option<UserSummary>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(with = "timestamp")]
    pub created_at: i64,
    #[serde(default)]
    pub read: bool,
    /// Synthesized on the client from a partial push payload.
    #[serde(default)]
    pub provisional: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFeed {
    #[serde(default)]
    pub items: Vec<Notification>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub from_user: UserSummary,
    pub to_user: UserSummary,
    #[serde(with = "timestamp")]
    pub created_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestLists {
    #[serde(default)]
    pub incoming: Vec<FriendRequest>,
    #[serde(default)]
    pub outgoing: Vec<FriendRequest>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub online: bool,
    #[serde(default, with = "optional_timestamp")]
    pub last_active_at: Option<i64>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteLink {
    pub code: String,
    pub url: String,
    #[serde(default, with = "optional_timestamp")]
    pub expires_at: Option<i64>,
}

/// One page of a cursor-paginated listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

fn default_true() -> bool {
    true
}

pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .ok()
        .or_else(|| raw.parse::<i64>().ok())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    fn into_millis<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            RawTimestamp::Millis(v) => Ok(v),
            RawTimestamp::Text(s) => {
                parse_timestamp(&s).ok_or_else(|| E::custom(format!("invalid timestamp: {s}")))
            }
        }
    }
}

mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawTimestamp;

    pub fn serialize<S: Serializer>(value: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        RawTimestamp::deserialize(d)?.into_millis()
    }
}

mod optional_timestamp {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::RawTimestamp;

    pub fn serialize<S: Serializer>(value: &Option<i64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Option::<RawTimestamp>::deserialize(d)? {
            Some(raw) => raw.into_millis().map(Some),
            None => Ok(None),
        }
    }
}
