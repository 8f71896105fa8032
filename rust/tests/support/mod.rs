#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use social_core::{ApiError, ApiRequest, AppReconciler, AppState, AppUpdate, Backend};

pub const ME: &str = "me";

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Short timers so grace periods and banners elapse quickly under test.
pub fn write_config(data_dir: &str) {
    let path = std::path::Path::new(data_dir).join("social_config.json");
    let v = json!({
        "api_base_url": "http://127.0.0.1:9/api",
        "request_timeout_ms": 2_000,
        "delete_grace_ms": 300,
        "presence_poll_secs": 60,
        "search_debounce_ms": 80,
        "back_online_banner_ms": 200,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => s.toast.clone(),
            _ => None,
        })
    }

    pub fn sounds(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                AppUpdate::PlayNotificationSound { message_id, .. } => Some(message_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every published state, in order.
    pub fn states(&self) -> Vec<AppState> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                AppUpdate::FullState(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}

pub fn conversation_json(id: &str, read: bool) -> Value {
    json!({
        "id": id,
        "participants": [{"id": ME, "name": "Me"}, {"id": "u2", "name": "Ada"}],
        "updatedAt": 1_000,
        "read": read,
        "lastMessage": {"senderId": "u2", "content": "hello", "createdAt": 1_000},
    })
}

pub fn message_json(id: &str, chat_id: &str, sender: &str, content: &str, at: i64) -> Value {
    json!({
        "id": id,
        "chatId": chat_id,
        "senderId": sender,
        "content": content,
        "createdAt": at,
    })
}

/// Scripted in-memory server. Records every request and answers from a small
/// fixture set; individual request kinds can be made to fail.
pub struct MockBackend {
    calls: Mutex<Vec<ApiRequest>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    deleted: Mutex<HashSet<String>>,
    next_id: Mutex<u64>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            deleted: Mutex::new(HashSet::new()),
            next_id: Mutex::new(0),
        })
    }

    /// Make every request with this tag fail with `err` until cleared.
    pub fn fail(&self, tag: &'static str, err: ApiError) {
        self.failures.lock().unwrap().insert(tag, err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn delay(&self, tag: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(tag, delay);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tag() == tag)
            .count()
    }

    fn respond(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        if let Some(err) = self.failures.lock().unwrap().get(request.tag()) {
            return Err(err.clone());
        }
        let value = match request {
            ApiRequest::FetchChats { archived: false, .. } => json!({
                "items": [conversation_json("c1", true), conversation_json("c2", false)],
                "nextCursor": null,
            }),
            ApiRequest::FetchChats { archived: true, .. } => json!({"items": []}),
            ApiRequest::FetchChat { chat_id } => conversation_json(chat_id, true),
            ApiRequest::FetchMessages { chat_id, .. } => {
                let deleted = self.deleted.lock().unwrap();
                let items: Vec<Value> = [("m1", "first", 1_000), ("m2", "second", 2_000)]
                    .into_iter()
                    .filter(|(id, _, _)| !deleted.contains(*id))
                    .map(|(id, content, at)| message_json(id, chat_id, "u2", content, at))
                    .collect();
                json!({"items": items, "nextCursor": null})
            }
            ApiRequest::DeleteMessage { message_id } => {
                self.deleted.lock().unwrap().insert(message_id.clone());
                Value::Null
            }
            ApiRequest::SendMessage {
                chat_id, content, ..
            } => {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                message_json(&format!("srv-{next}"), chat_id, ME, content, 10_000)
            }
            ApiRequest::EditMessage {
                message_id,
                content,
            } => {
                let mut m = message_json(message_id, "c1", "u2", content, 1_000);
                m["edited"] = json!(true);
                m
            }
            ApiRequest::FetchNotifications => json!({"items": [], "unreadCount": 0}),
            ApiRequest::FetchFriends | ApiRequest::FetchBlockedUsers => json!([]),
            ApiRequest::FetchFriendRequests => json!({"incoming": [], "outgoing": []}),
            ApiRequest::SearchUsers { query } => json!([{"id": "u9", "name": query}]),
            ApiRequest::FetchPresence { user_ids } => Value::Array(
                user_ids
                    .iter()
                    .map(|id| json!({"userId": id, "online": true}))
                    .collect(),
            ),
            _ => Value::Null,
        };
        Ok(value)
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn execute(&self, _access_token: &str, request: ApiRequest) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(request.clone());
        let delay = self.delays.lock().unwrap().get(request.tag()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.respond(&request)
    }
}
