//! Push-channel events, validated at the boundary.
//!
//! The transport hands us an event name and a JSON payload. Anything we do not
//! recognise, or that does not match the expected shape, is rejected here and
//! never reaches the reconciler.

use serde::Deserialize;

use crate::model::{Message, Notification, UserSummary};

#[derive(Debug, thiserror::Error)]
pub enum PushDecodeError {
    #[error("unknown push event `{0}`")]
    UnknownEvent(String),
    #[error("malformed `{event}` payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    #[serde(rename = "message:received")]
    MessageReceived { message: Message },

    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead {
        chat_id: String,
        message_ids: Vec<String>,
        #[serde(default)]
        reader_id: Option<String>,
    },

    #[serde(rename = "user:online", rename_all = "camelCase")]
    UserOnline { user_id: String },

    #[serde(rename = "user:offline", rename_all = "camelCase")]
    UserOffline {
        user_id: String,
        #[serde(default)]
        last_active_at: Option<serde_json::Value>,
    },

    #[serde(rename = "message:deleted", rename_all = "camelCase")]
    MessageDeleted { message_id: String, chat_id: String },

    #[serde(rename = "message:updated")]
    MessageUpdated { message: Message },

    #[serde(rename = "conversation:deleted", rename_all = "camelCase")]
    ConversationDeleted { chat_id: String },

    #[serde(rename = "ownership:transferred", rename_all = "camelCase")]
    OwnershipTransferred {
        chat_id: String,
        new_owner_id: String,
        #[serde(default)]
        previous_owner_id: Option<String>,
    },

    #[serde(rename = "notification:new")]
    NotificationNew { notification: Notification },

    #[serde(rename = "join_request:new")]
    JoinRequestNew(JoinRequestPayload),
}

/// `join_request:new` arrives in several shapes; everything is optional and a
/// provisional notification is synthesized when the full one is missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestPayload {
    #[serde(default)]
    pub notification: Option<Notification>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default, alias = "groupId")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default, alias = "user")]
    pub requester: Option<UserSummary>,
}

impl PushEvent {
    pub const NAMES: &'static [&'static str] = &[
        "message:received",
        "message:read",
        "user:online",
        "user:offline",
        "message:deleted",
        "message:updated",
        "conversation:deleted",
        "ownership:transferred",
        "notification:new",
        "join_request:new",
    ];

    pub fn decode(name: &str, payload_json: &str) -> Result<Self, PushDecodeError> {
        if !Self::NAMES.contains(&name) {
            return Err(PushDecodeError::UnknownEvent(name.to_string()));
        }
        let malformed = |source| PushDecodeError::Malformed {
            event: name.to_string(),
            source,
        };
        let data: serde_json::Value = serde_json::from_str(payload_json).map_err(malformed)?;
        serde_json::from_value(serde_json::json!({ "event": name, "data": data }))
            .map_err(malformed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::MessageReceived { .. } => "message:received",
            PushEvent::MessageRead { .. } => "message:read",
            PushEvent::UserOnline { .. } => "user:online",
            PushEvent::UserOffline { .. } => "user:offline",
            PushEvent::MessageDeleted { .. } => "message:deleted",
            PushEvent::MessageUpdated { .. } => "message:updated",
            PushEvent::ConversationDeleted { .. } => "conversation:deleted",
            PushEvent::OwnershipTransferred { .. } => "ownership:transferred",
            PushEvent::NotificationNew { .. } => "notification:new",
            PushEvent::JoinRequestNew(_) => "join_request:new",
        }
    }
}

impl JoinRequestPayload {
    /// The notification to show: the server's if present, otherwise a provisional one.
    pub fn into_notification(self, now_ms: i64) -> Notification {
        if let Some(n) = self.notification {
            return n;
        }
        let who = self
            .requester
            .as_ref()
            .map(UserSummary::display_name)
            .unwrap_or_else(|| "Someone".to_string());
        let text = match self.group_name.as_deref() {
            Some(group) => format!("{who} asked to join {group}"),
            None => format!("{who} asked to join your group"),
        };
        let id = match &self.request_id {
            Some(rid) => format!("join-request-{rid}"),
            None => crate::model::local_id(),
        };
        Notification {
            id,
            kind: "join_request".to_string(),
            actor: self.requester,
            chat_id: self.chat_id,
            text,
            created_at: now_ms,
            read: false,
            provisional: true,
        }
    }
}

/// `lastActiveAt` may be a number or an RFC 3339 string; anything else is dropped.
pub fn last_active_millis(raw: &Option<serde_json::Value>) -> Option<i64> {
    match raw.as_ref()? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => crate::model::parse_timestamp(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_message_received() {
        let ev = PushEvent::decode(
            "message:received",
            &json!({
                "message": {
                    "id": "m1",
                    "chatId": "c1",
                    "senderId": "u2",
                    "content": "hey",
                    "createdAt": "2024-05-01T10:00:00Z",
                }
            })
            .to_string(),
        )
        .unwrap();
        match ev {
            PushEvent::MessageReceived { message } => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.created_at, 1_714_557_600_000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_camel_case_payloads() {
        let ev = PushEvent::decode(
            "message:read",
            r#"{"chatId":"c1","messageIds":["m1","m2"],"readerId":"u3"}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            PushEvent::MessageRead {
                chat_id: "c1".into(),
                message_ids: vec!["m1".into(), "m2".into()],
                reader_id: Some("u3".into()),
            }
        );
        let ev = PushEvent::decode(
            "ownership:transferred",
            r#"{"chatId":"g1","newOwnerId":"u2"}"#,
        )
        .unwrap();
        assert_eq!(ev.name(), "ownership:transferred");
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = PushEvent::decode("typing:start", "{}").unwrap_err();
        assert!(matches!(err, PushDecodeError::UnknownEvent(name) if name == "typing:start"));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(
            PushEvent::decode("message:received", r#"{"message":{"id":"m1"}}"#),
            Err(PushDecodeError::Malformed { .. })
        ));
        assert!(matches!(
            PushEvent::decode("user:online", "not json"),
            Err(PushDecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn offline_timestamp_accepts_both_shapes() {
        let ev = PushEvent::decode(
            "user:offline",
            r#"{"userId":"u2","lastActiveAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        let PushEvent::UserOffline { last_active_at, .. } = ev else {
            panic!("wrong variant");
        };
        assert_eq!(last_active_millis(&last_active_at), Some(1_714_557_600_000));
        assert_eq!(last_active_millis(&Some(serde_json::json!(42))), Some(42));
        assert_eq!(last_active_millis(&Some(serde_json::json!(true))), None);
    }

    #[test]
    fn join_request_without_notification_is_synthesized() {
        let ev = PushEvent::decode(
            "join_request:new",
            &json!({
                "requestId": "r7",
                "groupId": "g1",
                "groupName": "Climbers",
                "requester": {"id": "u5", "name": "Lin"},
            })
            .to_string(),
        )
        .unwrap();
        let PushEvent::JoinRequestNew(payload) = ev else {
            panic!("wrong variant");
        };
        let n = payload.into_notification(99);
        assert_eq!(n.id, "join-request-r7");
        assert_eq!(n.chat_id.as_deref(), Some("g1"));
        assert_eq!(n.text, "Lin asked to join Climbers");
        assert!(n.provisional);
        assert!(!n.read);
    }

    #[test]
    fn join_request_with_full_notification_passes_through() {
        let ev = PushEvent::decode(
            "join_request:new",
            &json!({
                "notification": {
                    "id": "n1",
                    "kind": "join_request",
                    "text": "Lin wants in",
                    "createdAt": 5,
                }
            })
            .to_string(),
        )
        .unwrap();
        let PushEvent::JoinRequestNew(payload) = ev else {
            panic!("wrong variant");
        };
        let n = payload.into_notification(99);
        assert_eq!(n.id, "n1");
        assert!(!n.provisional);
    }
}
