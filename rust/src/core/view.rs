// Cache-derived state projection.

use std::collections::HashSet;

use crate::model::{Conversation, Message};
use crate::state::{
    ChatMessage, ChatSummary, ChatViewState, FriendRequestsState, NotificationsState,
};

use super::AppCore;

impl AppCore {
    /// Rebuild every cache-backed field of `state`. Cheap enough to run on
    /// each publish; the cache is the source of truth.
    pub(super) fn refresh_views(&mut self) {
        if !self.is_logged_in() {
            return;
        }
        self.refresh_chat_lists();
        self.refresh_current_chat();

        self.state.pending_deletions = self.deletions.views();
        self.state.notifications = match self.cache.notifications() {
            Some(feed) => NotificationsState {
                items: feed.items.clone(),
                unread_count: feed.unread_count,
            },
            None => NotificationsState::empty(),
        };
        self.state.friends = self.cache.friends().map(<[_]>::to_vec).unwrap_or_default();
        self.state.friend_requests = match self.cache.friend_requests() {
            Some(lists) => FriendRequestsState {
                incoming: lists.incoming.clone(),
                outgoing: lists.outgoing.clone(),
            },
            None => FriendRequestsState::empty(),
        };
        self.state.blocked_users = self
            .cache
            .blocked_users()
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        self.state.presence = self.presence.snapshot();
    }

    fn refresh_chat_lists(&mut self) {
        // A chat may sit in either list's pages mid-move; the flag decides where it shows.
        let mut seen = HashSet::new();
        let mut all: Vec<&Conversation> = [false, true]
            .into_iter()
            .filter_map(|archived| self.cache.chats(archived))
            .flat_map(|pages| pages.items())
            .filter(|c| seen.insert(c.id.as_str()))
            .collect();
        all.sort_by_key(|c| std::cmp::Reverse(c.activity_at()));

        let me = self.my_user_id();
        let (archived, active): (Vec<_>, Vec<_>) = all
            .into_iter()
            .map(|c| chat_summary(c, me))
            .partition(|c| c.archived);
        let more = self
            .cache
            .chats(self.state.showing_archived)
            .is_some_and(|pages| pages.last_cursor().is_some());

        self.state.chat_list = active;
        self.state.archived_chat_list = archived;
        self.state.can_load_more_chats = more;
    }

    fn refresh_current_chat(&mut self) {
        let Some(chat_id) = self.current_chat_id.as_deref() else {
            self.state.current_chat = None;
            return;
        };
        let Some(conversation) = self.cache.find_conversation(chat_id) else {
            // Still loading: keep an empty shell so the screen can show progress.
            self.state.current_chat = Some(ChatViewState {
                chat_id: chat_id.to_string(),
                is_group: false,
                title: String::new(),
                members: vec![],
                owner_id: None,
                is_owner: false,
                messages: self.chat_messages(chat_id, None),
                pinned_message_ids: vec![],
                can_load_older: false,
            });
            return;
        };

        let me = self.my_user_id();
        let pages = self.cache.messages(chat_id);
        let pinned_message_ids = pages
            .map(|p| p.items().filter(|m| m.pinned).map(|m| m.id.clone()).collect())
            .unwrap_or_default();
        let view = ChatViewState {
            chat_id: chat_id.to_string(),
            is_group: conversation.is_group,
            title: chat_title(conversation, me),
            members: conversation.participants.clone(),
            owner_id: conversation.owner_id.clone(),
            is_owner: me.is_some() && conversation.owner_id.as_deref() == me,
            messages: self.chat_messages(chat_id, Some(conversation)),
            pinned_message_ids,
            can_load_older: pages.is_some_and(|p| p.first_cursor().is_some()),
        };
        self.state.current_chat = Some(view);
    }

    fn chat_messages(
        &self,
        chat_id: &str,
        conversation: Option<&Conversation>,
    ) -> Vec<ChatMessage> {
        let me = self.my_user_id();
        self.cache
            .messages(chat_id)
            .map(|pages| {
                pages
                    .items()
                    .map(|m| chat_message(m, me, conversation))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn chat_title(c: &Conversation, me: Option<&str>) -> String {
    if let Some(name) = c.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }
    let others: Vec<String> = c
        .participants
        .iter()
        .filter(|p| Some(p.id.as_str()) != me)
        .map(|p| p.display_name())
        .collect();
    if others.is_empty() {
        "Just you".into()
    } else {
        others.join(", ")
    }
}

fn chat_summary(c: &Conversation, me: Option<&str>) -> ChatSummary {
    ChatSummary {
        chat_id: c.id.clone(),
        is_group: c.is_group,
        title: chat_title(c, me),
        avatar: c.avatar.clone().or_else(|| {
            if c.is_group {
                return None;
            }
            c.participants
                .iter()
                .find(|p| Some(p.id.as_str()) != me)
                .and_then(|p| p.avatar.clone())
        }),
        members: c.participants.clone(),
        owner_id: c.owner_id.clone(),
        last_message: c.last_message.as_ref().map(|m| m.content.clone()),
        last_message_sender_id: c.last_message.as_ref().map(|m| m.sender_id.clone()),
        last_message_at: c.last_message.as_ref().map(|_| c.activity_at()),
        is_read: c.read,
        archived: c.archived,
    }
}

fn chat_message(m: &Message, me: Option<&str>, conversation: Option<&Conversation>) -> ChatMessage {
    let is_mine = Some(m.sender_id.as_str()) == me;
    let sender_name = if is_mine {
        None
    } else {
        conversation
            .and_then(|c| c.participant(&m.sender_id))
            .and_then(|p| p.name.clone())
    };
    ChatMessage {
        id: m.id.clone(),
        sender_id: m.sender_id.clone(),
        sender_name,
        content: m.content.clone(),
        timestamp: m.created_at,
        is_mine,
        status: m.status,
        failure_reason: m.failure_reason.clone(),
        pinned: m.pinned,
        edited: m.edited,
        read_by: m.read_by.clone(),
    }
}
