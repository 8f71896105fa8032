use serde_json::Value;

use crate::api::{decode, ApiRequest};
use crate::error::ApiError;
use crate::model::UserSummary;
use crate::updates::InternalEvent;

use super::AppCore;

impl AppCore {
    /// Debounced user search. Each keystroke supersedes the pending query;
    /// only the latest query's results are kept.
    pub(super) fn search_users(&mut self, query: &str) {
        self.search_token += 1;
        if let Some(timer) = self.search_timer.take() {
            timer.abort();
        }
        let query = query.trim().to_string();
        self.state.search.query = query.clone();

        if query.is_empty() {
            self.state.search.results.clear();
            self.state.busy.searching = false;
            self.emit_state();
            return;
        }

        let token = self.search_token;
        self.search_timer = Some(self.spawn_timer(
            self.config.search_debounce(),
            InternalEvent::SearchDebounceElapsed { token },
        ));
        self.state.busy.searching = true;
        self.emit_state();
    }

    pub(super) fn on_search_debounce_elapsed(&mut self, token: u64) {
        if token != self.search_token {
            return;
        }
        self.search_timer = None;
        let query = self.state.search.query.clone();
        tracing::debug!(len = query.len(), "search");
        self.spawn_request(ApiRequest::SearchUsers { query }, move |result| {
            InternalEvent::SearchResults { token, result }
        });
    }

    pub(super) fn on_search_results(&mut self, token: u64, result: Result<Value, ApiError>) {
        if token != self.search_token {
            tracing::debug!(token, "stale search results dropped");
            return;
        }
        self.state.busy.searching = false;
        match result.and_then(decode::<Vec<UserSummary>>) {
            Ok(users) => {
                self.state.search.results = users;
                self.emit_state();
            }
            Err(e) => {
                self.state.search.results.clear();
                self.toast(format!("Search failed: {e}"));
            }
        }
    }
}
