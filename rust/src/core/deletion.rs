//! Delete with undo.
//!
//! Deleting hides the message right away and starts a grace timer. Undo inside
//! the window puts it back and cancels the timer. When the timer fires, the
//! remote delete goes out once through the optimistic flow; if it fails the
//! message comes back. Any number of deletions can be pending at once.

use std::collections::HashMap;

use tokio::task::AbortHandle;

use crate::api::ApiRequest;
use crate::cache::{QueryKey, RestorePoint};
use crate::model::{Message, MessageStatus};
use crate::state::{now_millis, PendingDeletionView};
use crate::updates::InternalEvent;

use super::optimistic::{inverse, Mutation};
use super::AppCore;

struct PendingDeletion {
    chat_id: String,
    point: RestorePoint<Message>,
    token: u64,
    timer: AbortHandle,
    commits_at: i64,
}

#[derive(Default)]
pub(super) struct PendingDeletions {
    entries: HashMap<String, PendingDeletion>,
    next_token: u64,
}

impl PendingDeletions {
    pub(super) fn contains(&self, message_id: &str) -> bool {
        self.entries.contains_key(message_id)
    }

    /// Stop tracking a deletion without restoring or committing it.
    pub(super) fn forget(&mut self, message_id: &str) {
        if let Some(entry) = self.entries.remove(message_id) {
            entry.timer.abort();
        }
    }

    /// Abort every grace timer. Nothing is sent to the server.
    pub(super) fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
        }
    }

    pub(super) fn views(&self) -> Vec<PendingDeletionView> {
        let mut views: Vec<PendingDeletionView> = self
            .entries
            .iter()
            .map(|(id, entry)| PendingDeletionView {
                message_id: id.clone(),
                chat_id: entry.chat_id.clone(),
                commits_at: entry.commits_at,
            })
            .collect();
        views.sort_by(|a, b| {
            a.commits_at
                .cmp(&b.commits_at)
                .then_with(|| a.message_id.cmp(&b.message_id))
        });
        views
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

impl AppCore {
    pub(super) fn delete_message(&mut self, chat_id: &str, message_id: &str) {
        if self.deletions.contains(message_id) {
            return;
        }
        let Some(message) = self.cache.find_message(chat_id, message_id).cloned() else {
            tracing::debug!(message_id, "delete of unknown message ignored");
            return;
        };
        if message.is_local() {
            // Never reached the server; nothing to undo remotely.
            if message.status == MessageStatus::Sending {
                self.toast("Wait for the message to finish sending");
                return;
            }
            self.cache
                .update_messages(chat_id, |pages| pages.remove(message_id).is_some());
            self.publish();
            return;
        }

        let mut removed = None;
        self.cache.update_messages(chat_id, |pages| {
            removed = pages.remove(message_id);
            removed.is_some()
        });
        let Some(point) = removed else {
            return;
        };

        let token = self.deletions.next_token();
        let grace = self.config.delete_grace();
        let timer = self.spawn_timer(
            grace,
            InternalEvent::DeletionGraceElapsed {
                message_id: message_id.to_string(),
                token,
            },
        );
        tracing::info!(message_id, grace_ms = grace.as_millis() as u64, "delete pending");
        self.deletions.entries.insert(
            message_id.to_string(),
            PendingDeletion {
                chat_id: chat_id.to_string(),
                point,
                token,
                timer,
                commits_at: now_millis() + grace.as_millis() as i64,
            },
        );
        self.publish();
    }

    pub(super) fn undo_delete(&mut self, message_id: &str) {
        let Some(entry) = self.deletions.entries.remove(message_id) else {
            tracing::debug!(message_id, "undo after grace window; ignored");
            return;
        };
        entry.timer.abort();
        let chat_id = entry.chat_id;
        let point = entry.point;
        self.cache.update_messages(&chat_id, move |pages| {
            pages.restore_sorted_by(point, |m| m.created_at)
        });
        tracing::info!(message_id, "delete undone");
        self.publish();
    }

    pub(super) fn on_deletion_grace_elapsed(&mut self, message_id: &str, token: u64) {
        let matches = self
            .deletions
            .entries
            .get(message_id)
            .is_some_and(|entry| entry.token == token);
        if !matches {
            return;
        }
        let Some(entry) = self.deletions.entries.remove(message_id) else {
            return;
        };
        let chat_id = entry.chat_id;
        let point = entry.point;
        let restore_chat = chat_id.clone();

        // Already hidden locally; the patch only hands back the restore.
        let mutation = Mutation::new(
            format!("delete:{message_id}"),
            ApiRequest::DeleteMessage {
                message_id: message_id.to_string(),
            },
            "Couldn't delete message",
        )
        .patch(move |_| {
            inverse(move |cache| {
                cache.update_messages(&restore_chat, move |pages| {
                    pages.restore_sorted_by(point, |m| m.created_at)
                });
            })
        })
        .invalidate(
            QueryKey::chat_lists()
                .into_iter()
                .chain([QueryKey::messages(&chat_id)]),
        );
        self.begin_mutation(mutation);
    }
}
