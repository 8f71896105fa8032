//! Push-event reconciliation.
//!
//! Each event becomes the smallest cache patch that keeps the views correct.
//! Patches are idempotent: replaying an event leaves the cache as the first
//! delivery did. Work outside the cache is returned as [`Effect`]s for the
//! actor to carry out.

use std::collections::{HashSet, VecDeque};

use crate::cache::{QueryCache, QueryData, QueryKey};
use crate::events::{last_active_millis, PushEvent};
use crate::model::{Message, MessageStatus, Notification};

use super::presence::PresenceBook;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Effect {
    /// A message from someone else arrived.
    PlaySound { chat_id: String, message_id: String },
    /// A message arrived in the conversation the user is looking at.
    MarkRead { chat_id: String },
    Toast(String),
    CloseChat { chat_id: String },
    /// The server removed a message the user was about to delete.
    DropPendingDeletion { message_id: String },
    PresenceChanged,
    /// Keys were invalidated and observed ones need refetching.
    Refetch,
}

const SEEN_MESSAGES_CAP: usize = 1024;

/// Ids of recently delivered messages, oldest evicted first. Catches replays
/// the cache alone cannot, e.g. for conversations nothing has fetched yet.
#[derive(Default)]
pub(super) struct SeenMessages {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenMessages {
    /// Record `id`; false if it was already recorded.
    pub(super) fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > SEEN_MESSAGES_CAP {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub(super) fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

pub(super) struct ReconcileContext<'a> {
    pub(super) me: &'a str,
    pub(super) open_chat: Option<&'a str>,
    /// Messages soft-deleted locally; pushes must not bring them back.
    pub(super) is_hidden: &'a dyn Fn(&str) -> bool,
    pub(super) now_ms: i64,
}

pub(super) fn reconcile(
    cache: &mut QueryCache,
    presence: &mut PresenceBook,
    seen: &mut SeenMessages,
    ctx: &ReconcileContext<'_>,
    event: PushEvent,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    match event {
        PushEvent::MessageReceived { message } => {
            let first_delivery = seen.insert(&message.id);
            message_received(cache, ctx, message, first_delivery, &mut effects);
        }
        PushEvent::MessageRead {
            chat_id,
            message_ids,
            reader_id,
        } => {
            cache.update_messages(&chat_id, |pages| {
                let mut changed = false;
                for id in &message_ids {
                    changed |= pages.update(id, |m| {
                        m.status = MessageStatus::Seen;
                        if let Some(reader) = &reader_id {
                            if !m.read_by.contains(reader) {
                                m.read_by.push(reader.clone());
                            }
                        }
                    });
                }
                changed
            });
            invalidate_chat_lists(cache, &mut effects);
        }
        PushEvent::UserOnline { user_id } => {
            if presence.set(&user_id, true, None) {
                effects.push(Effect::PresenceChanged);
            }
        }
        PushEvent::UserOffline {
            user_id,
            last_active_at,
        } => {
            let last_active = last_active_millis(&last_active_at).or(Some(ctx.now_ms));
            if presence.set(&user_id, false, last_active) {
                effects.push(Effect::PresenceChanged);
            }
        }
        PushEvent::MessageDeleted {
            message_id,
            chat_id,
        } => {
            cache.update_messages(&chat_id, |pages| pages.remove(&message_id).is_some());
            if (ctx.is_hidden)(&message_id) {
                effects.push(Effect::DropPendingDeletion { message_id });
            }
            invalidate_chat_lists(cache, &mut effects);
        }
        PushEvent::MessageUpdated { message } => {
            if !(ctx.is_hidden)(&message.id) {
                let chat_id = message.chat_id.clone();
                cache.update_messages(&chat_id, |pages| {
                    let changed = pages
                        .find(&message.id)
                        .is_some_and(|existing| *existing != message);
                    changed && pages.replace(&message.id.clone(), message)
                });
            }
            invalidate_chat_lists(cache, &mut effects);
        }
        PushEvent::ConversationDeleted { chat_id } => {
            cache.remove(&QueryKey::messages(&chat_id));
            cache.remove(&QueryKey::chat(&chat_id));
            invalidate_chat_lists(cache, &mut effects);
            if ctx.open_chat == Some(chat_id.as_str()) {
                effects.push(Effect::CloseChat { chat_id });
                effects.push(Effect::Toast("This conversation was deleted".to_string()));
            }
        }
        PushEvent::OwnershipTransferred {
            chat_id,
            new_owner_id,
            ..
        } => {
            cache.update_conversation(&chat_id, |c| c.owner_id = Some(new_owner_id.clone()));
            if cache.invalidate(&QueryKey::chat(&chat_id)) {
                effects.push(Effect::Refetch);
            }
            invalidate_chat_lists(cache, &mut effects);
            if new_owner_id == ctx.me {
                let group = cache
                    .find_conversation(&chat_id)
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| "the group".to_string());
                effects.push(Effect::Toast(format!("You are now the owner of {group}")));
            }
        }
        PushEvent::NotificationNew { notification } => {
            notification_new(cache, notification, &mut effects);
        }
        PushEvent::JoinRequestNew(payload) => {
            let notification = payload.into_notification(ctx.now_ms);
            let provisional = notification.provisional;
            notification_new(cache, notification, &mut effects);
            // The server's copy replaces the synthesized one on refetch.
            if provisional && cache.invalidate(&QueryKey::Notifications) {
                effects.push(Effect::Refetch);
            }
        }
    }
    effects
}

fn message_received(
    cache: &mut QueryCache,
    ctx: &ReconcileContext<'_>,
    message: Message,
    first_delivery: bool,
    effects: &mut Vec<Effect>,
) {
    if (ctx.is_hidden)(&message.id) {
        tracing::debug!(message_id = %message.id, "message pending local delete; skipped");
        return;
    }
    let from_me = message.sender_id == ctx.me;
    let chat_id = message.chat_id.clone();

    // (a) Conversation summary in every chat list that holds it.
    let summary = message.summary();
    let touched = cache.update_where(QueryKey::is_chat_list, |_, data| match data {
        QueryData::Chats(pages) => {
            let current = pages.find(&chat_id)?;
            let read = from_me;
            if current.last_message.as_ref() == Some(&summary)
                && current.read == read
                && current.updated_at >= message.created_at
            {
                return None;
            }
            let mut next = pages.clone();
            next.update(&chat_id, |c| {
                c.last_message = Some(summary.clone());
                c.updated_at = c.updated_at.max(message.created_at);
                c.read = read;
            });
            Some(QueryData::Chats(next))
        }
        _ => None,
    });
    let known = [false, true]
        .into_iter()
        .any(|archived| cache.chats(archived).is_some_and(|p| p.contains(&chat_id)));
    if !known && touched == 0 {
        // A conversation we have not fetched yet; let the list refetch bring it in.
        invalidate_chat_lists(cache, effects);
    }

    // (b) Append to the cached thread, replacing a provisional local copy.
    let mut inserted = false;
    cache.update_messages(&chat_id, |pages| {
        if pages.contains(&message.id) {
            tracing::debug!(message_id = %message.id, "duplicate message ignored");
            return false;
        }
        let local = pages
            .items()
            .find(|m| {
                m.is_local()
                    && m.sender_id == message.sender_id
                    && m.content == message.content
                    && matches!(m.status, MessageStatus::Sending | MessageStatus::Failed)
            })
            .map(|m| m.id.clone());
        inserted = match local {
            Some(local_id) => pages.replace(&local_id, message.clone()),
            None => pages.push_last(message.clone()),
        };
        inserted
    });
    let replay = !first_delivery
        || (!inserted
            && (cache.find_message(&chat_id, &message.id).is_some() || (known && touched == 0)));
    if replay {
        // Already applied once; no side effects the second time.
        return;
    }

    // (c) Side effects for messages from other people.
    if !from_me {
        if ctx.open_chat == Some(chat_id.as_str()) {
            effects.push(Effect::MarkRead {
                chat_id: chat_id.clone(),
            });
        }
        effects.push(Effect::PlaySound {
            chat_id,
            message_id: message.id,
        });
    }
}

fn notification_new(cache: &mut QueryCache, notification: Notification, effects: &mut Vec<Effect>) {
    let text = notification.text.clone();
    let inserted = cache.update_notifications(|feed| {
        if feed.items.iter().any(|n| n.id == notification.id) {
            return false;
        }
        if !notification.read {
            feed.unread_count += 1;
        }
        feed.items.insert(0, notification);
        true
    });
    if inserted {
        let msg = if text.trim().is_empty() {
            "New notification".to_string()
        } else {
            text
        };
        effects.push(Effect::Toast(msg));
    }
}

fn invalidate_chat_lists(cache: &mut QueryCache, effects: &mut Vec<Effect>) {
    if !cache.invalidate_where(QueryKey::is_chat_list).is_empty() {
        effects.push(Effect::Refetch);
    }
}
