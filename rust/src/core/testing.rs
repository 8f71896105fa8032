//! Helpers for actor unit tests: a core signed in against a backend that
//! never answers, so tests settle requests by hand.

use std::sync::{Arc, RwLock};

use flume::Receiver;
use serde_json::Value;

use crate::actions::AppAction;
use crate::api::{ApiRequest, Backend};
use crate::cache::{PageCollection, QueryData, QueryKey};
use crate::error::ApiError;
use crate::model::{Conversation, Message, MessageStatus, Page, UserSummary};
use crate::state::AppState;
use crate::updates::{AppUpdate, CoreMsg};

use super::AppCore;

pub(super) const ME: &str = "me";

struct StalledBackend;

#[async_trait::async_trait]
impl Backend for StalledBackend {
    async fn execute(&self, _access_token: &str, _request: ApiRequest) -> Result<Value, ApiError> {
        std::future::pending().await
    }
}

pub(super) struct Harness {
    pub(super) core: AppCore,
    #[allow(dead_code)]
    pub(super) updates: Receiver<AppUpdate>,
    _internal: Receiver<CoreMsg>,
    _dir: tempfile::TempDir,
}

pub(super) fn signed_in_core() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let (update_tx, updates) = flume::unbounded();
    let (core_tx, internal) = flume::unbounded();
    let shared = Arc::new(RwLock::new(AppState::empty()));
    let mut core = AppCore::new(
        update_tx,
        core_tx,
        dir.path().to_string_lossy().to_string(),
        shared,
        Some(Arc::new(StalledBackend)),
    );
    core.handle_message(CoreMsg::Action(AppAction::SignIn {
        user_id: ME.into(),
        access_token: "token".into(),
    }));
    Harness {
        core,
        updates,
        _internal: internal,
        _dir: dir,
    }
}

pub(super) fn message(id: &str, chat_id: &str, sender: &str) -> Message {
    Message {
        id: id.into(),
        chat_id: chat_id.into(),
        sender_id: sender.into(),
        content: format!("text of {id}"),
        created_at: 1_000,
        status: MessageStatus::Sent,
        pinned: false,
        read_by: vec![],
        edited: false,
        failure_reason: None,
    }
}

pub(super) fn conversation(id: &str, archived: bool) -> Conversation {
    Conversation {
        id: id.into(),
        participants: vec![UserSummary::bare(ME), UserSummary::bare("u2")],
        name: None,
        avatar: None,
        is_group: false,
        owner_id: None,
        last_message: None,
        updated_at: 1_000,
        archived,
        read: true,
    }
}

pub(super) fn seed_messages(core: &mut AppCore, chat_id: &str, ids: &[&str]) {
    let items = ids
        .iter()
        .zip(1..)
        .map(|(id, n)| Message {
            created_at: n * 1_000,
            ..message(id, chat_id, "u2")
        })
        .collect();
    core.cache.set(
        QueryKey::messages(chat_id),
        QueryData::Messages(PageCollection::from_first_page(Page::new(items, None))),
    );
}

pub(super) fn seed_chats(core: &mut AppCore, archived: bool, chats: Vec<Conversation>) {
    core.cache.set(
        QueryKey::chat_list(archived),
        QueryData::Chats(PageCollection::from_first_page(Page::new(chats, None))),
    );
}
