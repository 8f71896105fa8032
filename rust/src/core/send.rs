use serde_json::Value;

use crate::api::{decode, ApiRequest};
use crate::cache::{PageCollection, QueryData, QueryKey};
use crate::error::ApiError;
use crate::model::{local_id, Message, MessageStatus};
use crate::state::now_millis;
use crate::updates::InternalEvent;

use super::AppCore;

impl AppCore {
    /// Show the message immediately as `sending`, then swap in the server's
    /// copy (or mark it `failed`) when the request settles.
    pub(super) fn send_message(&mut self, chat_id: &str, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let Some(me) = self.my_user_id().map(ToString::to_string) else {
            return;
        };

        let message = Message {
            id: local_id(),
            chat_id: chat_id.to_string(),
            sender_id: me,
            content: content.to_string(),
            created_at: now_millis(),
            status: MessageStatus::Sending,
            pinned: false,
            read_by: vec![],
            edited: false,
            failure_reason: None,
        };
        let key = QueryKey::messages(chat_id);
        if !self.cache.contains(&key) {
            self.cache
                .set(key, QueryData::Messages(PageCollection::default()));
        }
        let summary = message.summary();
        self.cache
            .update_messages(chat_id, |pages| pages.push_last(message.clone()));
        self.cache.update_conversation(chat_id, |c| {
            c.last_message = Some(summary.clone());
            c.updated_at = c.updated_at.max(summary.created_at);
            c.read = true;
        });

        self.spawn_send(chat_id, &message.id, &message.content);
        self.publish();
    }

    pub(super) fn retry_message(&mut self, chat_id: &str, message_id: &str) {
        let Some(message) = self.cache.find_message(chat_id, message_id).cloned() else {
            return;
        };
        if !message.is_local() || message.status != MessageStatus::Failed {
            return;
        }
        tracing::info!(message_id, "retrying send");
        self.cache.update_messages(chat_id, |pages| {
            pages.update(message_id, |m| {
                m.status = MessageStatus::Sending;
                m.failure_reason = None;
            })
        });
        self.spawn_send(chat_id, &message.id, &message.content);
        self.publish();
    }

    fn spawn_send(&self, chat_id: &str, local_id: &str, content: &str) {
        let generation = self.generation;
        let chat = chat_id.to_string();
        let local = local_id.to_string();
        self.spawn_request(
            ApiRequest::SendMessage {
                chat_id: chat_id.to_string(),
                content: content.to_string(),
                client_id: local_id.to_string(),
            },
            move |result| InternalEvent::MessageSendResult {
                chat_id: chat,
                local_id: local,
                generation,
                result,
            },
        );
    }

    pub(super) fn on_message_sent(
        &mut self,
        chat_id: &str,
        local_id: &str,
        result: Result<Value, ApiError>,
    ) {
        match result.and_then(decode::<Message>) {
            Ok(sent) => {
                tracing::debug!(local_id, message_id = %sent.id, "message sent");
                let summary = sent.summary();
                self.cache.update_messages(chat_id, |pages| {
                    // The push echo may have replaced the local copy already.
                    if pages.contains(local_id) {
                        pages.replace(local_id, sent)
                    } else {
                        pages.push_last(sent)
                    }
                });
                self.cache.update_conversation(chat_id, |c| {
                    c.last_message = Some(summary.clone());
                    c.updated_at = c.updated_at.max(summary.created_at);
                });
            }
            Err(e) => {
                if self.cache.find_message(chat_id, local_id).is_none() {
                    // Replaced by the server echo or deleted; nothing left to mark.
                    return;
                }
                let reason = e.to_string();
                self.cache.update_messages(chat_id, |pages| {
                    pages.update(local_id, |m| {
                        m.status = MessageStatus::Failed;
                        m.failure_reason = Some(reason);
                    })
                });
                self.state.toast = Some("Message not sent. Tap to retry.".into());
            }
        }
        self.publish();
    }
}
