use serde_json::Value;

use crate::api::{decode, ApiRequest};
use crate::cache::{FetchMode, PageCollection, QueryData, QueryKey};
use crate::error::{ApiError, FailureKind};
use crate::model::{
    Conversation, FriendRequestLists, Message, NotificationFeed, Page, UserSummary,
};
use crate::updates::InternalEvent;

use super::AppCore;

impl AppCore {
    /// Fetch `key` from the server. At most one fetch per key is in flight;
    /// paging modes are no-ops when there is no further cursor.
    pub(super) fn fetch(&mut self, key: QueryKey, mode: FetchMode) {
        if !self.is_logged_in() || self.in_flight.contains(&key) {
            return;
        }
        let Some(request) = self.request_for(&key, mode) else {
            return;
        };

        match (&key, mode) {
            (QueryKey::ChatList { .. }, FetchMode::Replace) => self.state.busy.loading_chats = true,
            (QueryKey::ChatList { .. }, _) => self.state.busy.loading_more_chats = true,
            (QueryKey::Messages { .. }, FetchMode::Prepend) => {
                self.state.busy.loading_older_messages = true
            }
            _ => {}
        }

        tracing::debug!(key = %key, ?mode, "fetch");
        self.in_flight.insert(key.clone());
        let generation = self.generation;
        self.spawn_request(request, move |result| InternalEvent::QueryFetched {
            key,
            mode,
            generation,
            result,
        });
    }

    fn request_for(&self, key: &QueryKey, mode: FetchMode) -> Option<ApiRequest> {
        let request = match (key, mode) {
            (QueryKey::ChatList { archived }, FetchMode::Replace) => ApiRequest::FetchChats {
                archived: *archived,
                cursor: None,
            },
            (QueryKey::ChatList { archived }, _) => ApiRequest::FetchChats {
                archived: *archived,
                cursor: Some(self.cache.chats(*archived)?.last_cursor()?.to_string()),
            },
            (QueryKey::Messages { chat_id }, FetchMode::Replace) => ApiRequest::FetchMessages {
                chat_id: chat_id.clone(),
                cursor: None,
            },
            (QueryKey::Messages { chat_id }, _) => ApiRequest::FetchMessages {
                chat_id: chat_id.clone(),
                cursor: Some(self.cache.messages(chat_id)?.first_cursor()?.to_string()),
            },
            (QueryKey::Chat { chat_id }, _) => ApiRequest::FetchChat {
                chat_id: chat_id.clone(),
            },
            (QueryKey::Notifications, _) => ApiRequest::FetchNotifications,
            (QueryKey::Friends, _) => ApiRequest::FetchFriends,
            (QueryKey::FriendRequests, _) => ApiRequest::FetchFriendRequests,
            (QueryKey::BlockedUsers, _) => ApiRequest::FetchBlockedUsers,
        };
        Some(request)
    }

    pub(super) fn on_query_fetched(
        &mut self,
        key: QueryKey,
        mode: FetchMode,
        result: Result<Value, ApiError>,
    ) {
        self.in_flight.remove(&key);
        match (&key, mode) {
            (QueryKey::ChatList { .. }, FetchMode::Replace) => {
                self.state.busy.loading_chats = false
            }
            (QueryKey::ChatList { .. }, _) => self.state.busy.loading_more_chats = false,
            (QueryKey::Messages { .. }, FetchMode::Prepend) => {
                self.state.busy.loading_older_messages = false
            }
            _ => {}
        }

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.on_query_failed(&key, e);
                return;
            }
        };
        if let Err(e) = self.store_fetched(&key, mode, value) {
            tracing::warn!(key = %key, err = %e, "unexpected response shape");
            self.publish();
            return;
        }
        tracing::debug!(key = %key, ?mode, "fetched");
        self.publish();
    }

    fn on_query_failed(&mut self, key: &QueryKey, e: ApiError) {
        tracing::warn!(key = %key, err = %e, "fetch failed");
        let open = key.chat_id().is_some() && self.current_chat_id.as_deref() == key.chat_id();
        match e.kind() {
            FailureKind::NotFound if key.chat_id().is_some() => {
                // The conversation is gone; drop what we had for it.
                let chat_id = key.chat_id().unwrap_or_default().to_string();
                self.cache.remove(&QueryKey::chat(&chat_id));
                self.cache.remove(&QueryKey::messages(&chat_id));
                if open {
                    self.current_chat_id = None;
                    self.state.toast = Some("This conversation is no longer available".into());
                }
            }
            _ if key.is_chat_list() => {
                self.state.toast = Some(format!("Couldn't load chats: {e}"));
            }
            _ if open => {
                self.state.toast = Some(format!("Couldn't load messages: {e}"));
            }
            _ => {}
        }
        self.publish();
    }

    fn store_fetched(
        &mut self,
        key: &QueryKey,
        mode: FetchMode,
        value: Value,
    ) -> Result<(), ApiError> {
        match key {
            QueryKey::ChatList { archived } => {
                let page: Page<Conversation> = decode(value)?;
                let data = match (mode, self.cache.chats(*archived)) {
                    (FetchMode::Replace, _) | (_, None) => PageCollection::from_first_page(page),
                    (_, Some(existing)) => {
                        let mut next = existing.clone();
                        next.append_page(page);
                        next
                    }
                };
                self.cache.set(key.clone(), QueryData::Chats(data));
            }
            QueryKey::Chat { .. } => {
                let conversation: Conversation = decode(value)?;
                self.cache.set(key.clone(), QueryData::Chat(conversation));
            }
            QueryKey::Messages { chat_id } => {
                let mut page: Page<Message> = decode(value)?;
                // Oldest first within a page.
                page.items.sort_by_key(|m| m.created_at);
                page.items.retain(|m| !self.deletions.contains(&m.id));
                let data = match (mode, self.cache.messages(chat_id)) {
                    (FetchMode::Replace, previous) => {
                        let mut next = PageCollection::from_first_page(page);
                        // Provisional sends survive a refetch until the server echoes them.
                        if let Some(previous) = previous {
                            for local in previous.items().filter(|m| m.is_local()) {
                                let echoed = next.items().any(|m| {
                                    m.sender_id == local.sender_id && m.content == local.content
                                });
                                if !echoed {
                                    next.push_last(local.clone());
                                }
                            }
                        }
                        next
                    }
                    (_, None) => PageCollection::from_first_page(page),
                    (_, Some(existing)) => {
                        let mut next = existing.clone();
                        next.prepend_page(page);
                        next
                    }
                };
                self.cache.set(key.clone(), QueryData::Messages(data));
            }
            QueryKey::Notifications => {
                let feed: NotificationFeed = decode(value)?;
                self.cache.set(key.clone(), QueryData::Notifications(feed));
            }
            QueryKey::Friends => {
                let friends: Vec<UserSummary> = decode(value)?;
                self.cache.set(key.clone(), QueryData::Friends(friends));
            }
            QueryKey::FriendRequests => {
                let lists: FriendRequestLists = decode(value)?;
                self.cache.set(key.clone(), QueryData::FriendRequests(lists));
            }
            QueryKey::BlockedUsers => {
                let blocked: Vec<UserSummary> = decode(value)?;
                self.cache.set(key.clone(), QueryData::BlockedUsers(blocked));
            }
        }
        Ok(())
    }

    /// Refetch invalidated keys someone is looking at; drop the rest so the
    /// next read starts fresh.
    pub(super) fn refetch_invalidated(&mut self) {
        let stale: Vec<QueryKey> = self
            .cache
            .keys()
            .filter(|key| self.cache.is_stale(key))
            .cloned()
            .collect();
        for key in stale {
            if self.is_observed(&key) {
                self.fetch(key, FetchMode::Replace);
            } else {
                tracing::debug!(key = %key, "dropping unobserved stale key");
                self.cache.remove(&key);
            }
        }
    }

    fn is_observed(&self, key: &QueryKey) -> bool {
        match key {
            QueryKey::Chat { chat_id } | QueryKey::Messages { chat_id } => {
                self.current_chat_id.as_deref() == Some(chat_id.as_str())
            }
            _ => self.is_logged_in(),
        }
    }
}
