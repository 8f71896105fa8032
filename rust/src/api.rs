//! REST surface of the social backend.
//!
//! `ApiRequest` names every call the core makes; `Backend` executes them. The
//! production backend speaks JSON over HTTPS with a bearer token. Tests and
//! embedders can supply their own `Backend`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{classify_status, ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    // Conversations
    FetchChats {
        archived: bool,
        cursor: Option<String>,
    },
    FetchChat {
        chat_id: String,
    },
    FetchMessages {
        chat_id: String,
        cursor: Option<String>,
    },
    SendMessage {
        chat_id: String,
        content: String,
        client_id: String,
    },
    ArchiveChat {
        chat_id: String,
    },
    UnarchiveChat {
        chat_id: String,
    },
    MarkChatRead {
        chat_id: String,
    },

    // Messages
    PinMessage {
        message_id: String,
    },
    UnpinMessage {
        message_id: String,
    },
    DeleteMessage {
        message_id: String,
    },
    EditMessage {
        message_id: String,
        content: String,
    },

    // Users
    BlockUser {
        user_id: String,
    },
    UnblockUser {
        user_id: String,
    },
    FetchBlockedUsers,
    FetchPresence {
        user_ids: Vec<String>,
    },
    SearchUsers {
        query: String,
    },

    // Friends
    FetchFriends,
    FetchFriendRequests,
    SendFriendRequest {
        user_id: String,
    },
    AcceptFriendRequest {
        request_id: String,
    },
    RejectFriendRequest {
        request_id: String,
    },
    CancelFriendRequest {
        request_id: String,
    },

    // Groups
    CreateGroup {
        name: String,
        member_ids: Vec<String>,
    },
    UpdateGroup {
        chat_id: String,
        name: Option<String>,
        avatar: Option<String>,
    },
    AddGroupMember {
        chat_id: String,
        user_id: String,
    },
    RemoveGroupMember {
        chat_id: String,
        user_id: String,
    },
    TransferOwnership {
        chat_id: String,
        new_owner_id: String,
    },
    GenerateInviteLink {
        chat_id: String,
    },
    JoinViaInvite {
        code: String,
    },

    // Notifications
    FetchNotifications,
    MarkNotificationsRead,
}

impl ApiRequest {
    /// Log-safe request tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ApiRequest::FetchChats { .. } => "FetchChats",
            ApiRequest::FetchChat { .. } => "FetchChat",
            ApiRequest::FetchMessages { .. } => "FetchMessages",
            ApiRequest::SendMessage { .. } => "SendMessage",
            ApiRequest::ArchiveChat { .. } => "ArchiveChat",
            ApiRequest::UnarchiveChat { .. } => "UnarchiveChat",
            ApiRequest::MarkChatRead { .. } => "MarkChatRead",
            ApiRequest::PinMessage { .. } => "PinMessage",
            ApiRequest::UnpinMessage { .. } => "UnpinMessage",
            ApiRequest::DeleteMessage { .. } => "DeleteMessage",
            ApiRequest::EditMessage { .. } => "EditMessage",
            ApiRequest::BlockUser { .. } => "BlockUser",
            ApiRequest::UnblockUser { .. } => "UnblockUser",
            ApiRequest::FetchBlockedUsers => "FetchBlockedUsers",
            ApiRequest::FetchPresence { .. } => "FetchPresence",
            ApiRequest::SearchUsers { .. } => "SearchUsers",
            ApiRequest::FetchFriends => "FetchFriends",
            ApiRequest::FetchFriendRequests => "FetchFriendRequests",
            ApiRequest::SendFriendRequest { .. } => "SendFriendRequest",
            ApiRequest::AcceptFriendRequest { .. } => "AcceptFriendRequest",
            ApiRequest::RejectFriendRequest { .. } => "RejectFriendRequest",
            ApiRequest::CancelFriendRequest { .. } => "CancelFriendRequest",
            ApiRequest::CreateGroup { .. } => "CreateGroup",
            ApiRequest::UpdateGroup { .. } => "UpdateGroup",
            ApiRequest::AddGroupMember { .. } => "AddGroupMember",
            ApiRequest::RemoveGroupMember { .. } => "RemoveGroupMember",
            ApiRequest::TransferOwnership { .. } => "TransferOwnership",
            ApiRequest::GenerateInviteLink { .. } => "GenerateInviteLink",
            ApiRequest::JoinViaInvite { .. } => "JoinViaInvite",
            ApiRequest::FetchNotifications => "FetchNotifications",
            ApiRequest::MarkNotificationsRead => "MarkNotificationsRead",
        }
    }

    pub fn method(&self) -> HttpMethod {
        use ApiRequest::*;
        match self {
            FetchChats { .. }
            | FetchChat { .. }
            | FetchMessages { .. }
            | FetchBlockedUsers
            | FetchPresence { .. }
            | SearchUsers { .. }
            | FetchFriends
            | FetchFriendRequests
            | FetchNotifications => HttpMethod::Get,
            EditMessage { .. } | UpdateGroup { .. } => HttpMethod::Patch,
            UnarchiveChat { .. }
            | UnpinMessage { .. }
            | DeleteMessage { .. }
            | UnblockUser { .. }
            | CancelFriendRequest { .. }
            | RemoveGroupMember { .. } => HttpMethod::Delete,
            SendMessage { .. }
            | ArchiveChat { .. }
            | MarkChatRead { .. }
            | PinMessage { .. }
            | BlockUser { .. }
            | SendFriendRequest { .. }
            | AcceptFriendRequest { .. }
            | RejectFriendRequest { .. }
            | CreateGroup { .. }
            | AddGroupMember { .. }
            | TransferOwnership { .. }
            | GenerateInviteLink { .. }
            | JoinViaInvite { .. }
            | MarkNotificationsRead => HttpMethod::Post,
        }
    }

    /// Path segments under the API base. Ids and codes are single segments;
    /// the URL builder escapes them, so they can never change the route.
    pub fn path_segments(&self) -> Vec<&str> {
        use ApiRequest::*;
        match self {
            FetchChats { .. } => vec!["chats"],
            FetchChat { chat_id } => vec!["chats", chat_id.as_str()],
            FetchMessages { chat_id, .. } | SendMessage { chat_id, .. } => {
                vec!["chats", chat_id.as_str(), "messages"]
            }
            ArchiveChat { chat_id } | UnarchiveChat { chat_id } => {
                vec!["chats", chat_id.as_str(), "archive"]
            }
            MarkChatRead { chat_id } => vec!["chats", chat_id.as_str(), "read"],
            PinMessage { message_id } | UnpinMessage { message_id } => {
                vec!["messages", message_id.as_str(), "pin"]
            }
            DeleteMessage { message_id } | EditMessage { message_id, .. } => {
                vec!["messages", message_id.as_str()]
            }
            BlockUser { user_id } | UnblockUser { user_id } => {
                vec!["users", user_id.as_str(), "block"]
            }
            FetchBlockedUsers => vec!["users", "blocked"],
            FetchPresence { .. } => vec!["users", "presence"],
            SearchUsers { .. } => vec!["users", "search"],
            FetchFriends => vec!["friends"],
            FetchFriendRequests | SendFriendRequest { .. } => vec!["friend-requests"],
            AcceptFriendRequest { request_id } => {
                vec!["friend-requests", request_id.as_str(), "accept"]
            }
            RejectFriendRequest { request_id } => {
                vec!["friend-requests", request_id.as_str(), "reject"]
            }
            CancelFriendRequest { request_id } => vec!["friend-requests", request_id.as_str()],
            CreateGroup { .. } => vec!["groups"],
            UpdateGroup { chat_id, .. } => vec!["groups", chat_id.as_str()],
            AddGroupMember { chat_id, .. } => vec!["groups", chat_id.as_str(), "members"],
            RemoveGroupMember { chat_id, user_id } => {
                vec!["groups", chat_id.as_str(), "members", user_id.as_str()]
            }
            TransferOwnership { chat_id, .. } => vec!["groups", chat_id.as_str(), "owner"],
            GenerateInviteLink { chat_id } => vec!["groups", chat_id.as_str(), "invite-link"],
            JoinViaInvite { code } => vec!["invite-links", code.as_str(), "join"],
            FetchNotifications => vec!["notifications"],
            MarkNotificationsRead => vec!["notifications", "read"],
        }
    }

    /// Unescaped path, for logs and tests.
    pub fn path(&self) -> String {
        self.path_segments()
            .into_iter()
            .fold(String::new(), |path, segment| path + "/" + segment)
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        match self {
            ApiRequest::FetchChats { archived, cursor } => {
                q.push(("archived", archived.to_string()));
                if let Some(c) = cursor {
                    q.push(("cursor", c.clone()));
                }
            }
            ApiRequest::FetchMessages {
                cursor: Some(c), ..
            } => q.push(("cursor", c.clone())),
            ApiRequest::FetchPresence { user_ids } => q.push(("ids", user_ids.join(","))),
            ApiRequest::SearchUsers { query } => q.push(("q", query.clone())),
            _ => {}
        }
        q
    }

    pub fn body(&self) -> Option<Value> {
        match self {
            ApiRequest::SendMessage {
                content, client_id, ..
            } => Some(json!({ "content": content, "clientId": client_id })),
            ApiRequest::EditMessage { content, .. } => Some(json!({ "content": content })),
            ApiRequest::SendFriendRequest { user_id } => Some(json!({ "userId": user_id })),
            ApiRequest::CreateGroup { name, member_ids } => {
                Some(json!({ "name": name, "memberIds": member_ids }))
            }
            ApiRequest::UpdateGroup { name, avatar, .. } => {
                let mut body = serde_json::Map::new();
                if let Some(n) = name {
                    body.insert("name".into(), json!(n));
                }
                if let Some(a) = avatar {
                    body.insert("avatar".into(), json!(a));
                }
                Some(Value::Object(body))
            }
            ApiRequest::AddGroupMember { user_id, .. } => Some(json!({ "userId": user_id })),
            ApiRequest::TransferOwnership { new_owner_id, .. } => {
                Some(json!({ "newOwnerId": new_owner_id }))
            }
            _ => None,
        }
    }
}

/// Executes API requests on behalf of the signed-in user.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn execute(&self, access_token: &str, request: ApiRequest) -> Result<Value, ApiError>;
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| ApiError::Network(format!("bad base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Network(format!("bad base url {base_url}")));
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, request: &ApiRequest) -> Result<reqwest::Url, ApiError> {
        let segments = request.path_segments();
        // The URL builder silently skips dot segments, which would shift the route.
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ApiError::NotFound(format!("invalid id {bad:?}")));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Network(format!("bad base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn execute(&self, access_token: &str, request: ApiRequest) -> Result<Value, ApiError> {
        let url = self.url(&request)?;
        tracing::debug!(method = ?request.method(), path = %request.path(), "http request");
        let mut builder = match request.method() {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Patch => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        builder = builder.bearer_auth(access_token);
        let query = request.query();
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = request.body() {
            builder = builder.json(&body);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e.to_string())
            }
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Used when networking is disabled by config; every call fails fast.
pub struct OfflineBackend;

#[async_trait::async_trait]
impl Backend for OfflineBackend {
    async fn execute(&self, _access_token: &str, _request: ApiRequest) -> Result<Value, ApiError> {
        Err(ApiError::Network("network disabled".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_match_the_rest_surface() {
        let cases = [
            (
                ApiRequest::ArchiveChat {
                    chat_id: "c1".into(),
                },
                HttpMethod::Post,
                "/chats/c1/archive",
            ),
            (
                ApiRequest::UnarchiveChat {
                    chat_id: "c1".into(),
                },
                HttpMethod::Delete,
                "/chats/c1/archive",
            ),
            (
                ApiRequest::EditMessage {
                    message_id: "m1".into(),
                    content: "x".into(),
                },
                HttpMethod::Patch,
                "/messages/m1",
            ),
            (
                ApiRequest::RemoveGroupMember {
                    chat_id: "g1".into(),
                    user_id: "u2".into(),
                },
                HttpMethod::Delete,
                "/groups/g1/members/u2",
            ),
            (
                ApiRequest::JoinViaInvite { code: "abc".into() },
                HttpMethod::Post,
                "/invite-links/abc/join",
            ),
        ];
        for (req, method, path) in cases {
            assert_eq!(req.method(), method, "{}", req.tag());
            assert_eq!(req.path(), path, "{}", req.tag());
        }
    }

    #[test]
    fn query_and_body_shapes() {
        let req = ApiRequest::FetchChats {
            archived: true,
            cursor: Some("p2".into()),
        };
        assert_eq!(
            req.query(),
            vec![("archived", "true".to_string()), ("cursor", "p2".to_string())]
        );
        assert!(req.body().is_none());

        let req = ApiRequest::FetchPresence {
            user_ids: vec!["u1".into(), "u2".into()],
        };
        assert_eq!(req.query(), vec![("ids", "u1,u2".to_string())]);

        let req = ApiRequest::UpdateGroup {
            chat_id: "g1".into(),
            name: Some("Hikers".into()),
            avatar: None,
        };
        assert_eq!(req.body(), Some(json!({ "name": "Hikers" })));
    }

    fn backend() -> HttpBackend {
        HttpBackend::new("https://api.example.test/api/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn ids_are_escaped_into_a_single_segment() {
        let url = backend()
            .url(&ApiRequest::JoinViaInvite {
                code: "../../users/u9/block?".into(),
            })
            .unwrap();
        assert!(url.path().starts_with("/api/invite-links/"), "{url}");
        assert!(url.path().ends_with("/join"), "{url}");
        assert_eq!(url.path_segments().unwrap().count(), 4, "{url}");
        assert_eq!(url.query(), None);

        let url = backend()
            .url(&ApiRequest::FetchChat {
                chat_id: "c1".into(),
            })
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/api/chats/c1");
    }

    #[test]
    fn dot_segments_are_refused() {
        for code in ["..", ".", ""] {
            let err = backend()
                .url(&ApiRequest::JoinViaInvite { code: code.into() })
                .unwrap_err();
            assert!(matches!(err, ApiError::NotFound(_)), "{code:?}");
        }
    }

    #[test]
    fn decode_maps_shape_errors() {
        let err = decode::<crate::model::Message>(json!({ "id": 1 })).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
