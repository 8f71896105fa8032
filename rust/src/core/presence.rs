use std::collections::HashMap;

use serde_json::Value;

use crate::api::{decode, ApiRequest};
use crate::error::ApiError;
use crate::model::Presence;
use crate::updates::InternalEvent;

use super::AppCore;

/// Online/offline status by user id, fed by push events and polling.
#[derive(Debug, Default)]
pub(super) struct PresenceBook {
    entries: HashMap<String, Presence>,
}

impl PresenceBook {
    /// Record a status. Returns whether anything changed.
    pub(super) fn set(&mut self, user_id: &str, online: bool, last_active_at: Option<i64>) -> bool {
        let next = Presence {
            user_id: user_id.to_string(),
            online,
            last_active_at: last_active_at.or_else(|| {
                self.entries
                    .get(user_id)
                    .and_then(|p| p.last_active_at)
            }),
        };
        if self.entries.get(user_id) == Some(&next) {
            return false;
        }
        self.entries.insert(user_id.to_string(), next);
        true
    }

    #[cfg(test)]
    pub(super) fn get(&self, user_id: &str) -> Option<&Presence> {
        self.entries.get(user_id)
    }

    pub(super) fn snapshot(&self) -> Vec<Presence> {
        let mut all: Vec<Presence> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        all
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl AppCore {
    /// Replace the set of users whose presence is polled. Push events keep
    /// updating everyone; polling is the fallback for missed events.
    pub(super) fn watch_presence(&mut self, user_ids: Vec<String>) {
        let mut ids: Vec<String> = user_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        ids.sort();
        ids.dedup();
        if ids == self.watched_presence && self.presence_poll.is_some() {
            return;
        }

        self.stop_presence_polling();
        self.watched_presence = ids;
        if self.watched_presence.is_empty() {
            return;
        }

        let generation = self.presence_generation;
        let period = self.config.presence_poll_interval();
        tracing::debug!(users = self.watched_presence.len(), ?period, "presence polling");
        self.presence_poll = Some(self.spawn_interval(period, move || {
            InternalEvent::PresencePollTick { generation }
        }));
        self.poll_presence();
    }

    pub(super) fn stop_presence_polling(&mut self) {
        self.presence_generation += 1;
        if let Some(ticker) = self.presence_poll.take() {
            ticker.abort();
        }
        self.watched_presence.clear();
    }

    pub(super) fn poll_presence(&mut self) {
        if self.watched_presence.is_empty() {
            return;
        }
        let generation = self.presence_generation;
        self.spawn_request(
            ApiRequest::FetchPresence {
                user_ids: self.watched_presence.clone(),
            },
            move |result| InternalEvent::PresenceFetched { generation, result },
        );
    }

    pub(super) fn on_presence_fetched(&mut self, generation: u64, result: Result<Value, ApiError>) {
        if generation != self.presence_generation {
            return;
        }
        let statuses = match result.and_then(decode::<Vec<Presence>>) {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::debug!(err = %e, "presence poll failed");
                return;
            }
        };
        let mut changed = false;
        for p in statuses {
            changed |= self.presence.set(&p.user_id, p.online, p.last_active_at);
        }
        if changed {
            self.publish();
        }
    }
}
