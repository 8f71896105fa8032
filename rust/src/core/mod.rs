mod config;
mod connection;
mod deletion;
mod mutations;
mod optimistic;
mod otp;
mod presence;
mod queries;
mod reconcile;
mod search;
mod send;
#[cfg(test)]
mod testing;
mod view;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;
use serde_json::Value;
use tokio::task::AbortHandle;

use crate::actions::AppAction;
use crate::api::{ApiRequest, Backend, HttpBackend, OfflineBackend};
use crate::cache::{FetchMode, QueryCache, QueryKey};
use crate::countdown::CountdownGate;
use crate::error::ApiError;
use crate::events::PushEvent;
use crate::state::{now_millis, AppState, AuthState};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::default_app_config_json;

use deletion::PendingDeletions;
use optimistic::MutationBook;
use presence::PresenceBook;
use reconcile::{Effect, ReconcileContext, SeenMessages};

struct Session {
    user_id: String,
    access_token: String,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    data_dir: String,
    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    backend: Arc<dyn Backend>,

    session: Option<Session>,
    // Bumped on every sign-in/out; async results from an older session are dropped.
    generation: u64,

    cache: QueryCache,
    in_flight: HashSet<QueryKey>,
    mutations: MutationBook,
    deletions: PendingDeletions,
    otp: CountdownGate,

    presence: PresenceBook,
    seen_messages: SeenMessages,
    watched_presence: Vec<String>,
    presence_generation: u64,
    presence_poll: Option<AbortHandle>,

    search_token: u64,
    search_timer: Option<AbortHandle>,
    banner_token: u64,

    current_chat_id: Option<String>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        backend: Option<Arc<dyn Backend>>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let mut this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            data_dir,
            config,
            runtime,
            backend: Arc::new(OfflineBackend),
            session: None,
            generation: 0,
            cache: QueryCache::new(),
            in_flight: HashSet::new(),
            mutations: MutationBook::default(),
            deletions: PendingDeletions::default(),
            otp: CountdownGate::new(),
            presence: PresenceBook::default(),
            seen_messages: SeenMessages::default(),
            watched_presence: Vec::new(),
            presence_generation: 0,
            presence_poll: None,
            search_token: 0,
            search_timer: None,
            banner_token: 0,
            current_chat_id: None,
        };
        this.backend = match backend {
            Some(backend) => backend,
            None => this.default_backend(),
        };
        this.restore_otp_countdown();

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn default_backend(&self) -> Arc<dyn Backend> {
        if !self.network_enabled() {
            tracing::info!("network disabled by config");
            return Arc::new(OfflineBackend);
        }
        let base_url = self.config.api_base_url();
        match HttpBackend::new(&base_url, self.config.request_timeout()) {
            Ok(backend) => {
                tracing::info!(base_url = %base_url, "http backend ready");
                Arc::new(backend)
            }
            Err(e) => {
                tracing::error!(err = %e, "http client init failed; running offline");
                Arc::new(OfflineBackend)
            }
        }
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Re-derive every cache-backed view and emit a snapshot.
    fn publish(&mut self) {
        self.refresh_views();
        self.emit_state();
    }

    fn emit_notification_sound(&mut self, chat_id: String, message_id: String) {
        let rev = self.next_rev();
        // Keep the snapshot rev in step with the update stream for side-effect updates too.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::PlayNotificationSound {
            rev,
            chat_id,
            message_id,
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it.
        self.state.toast = Some(msg.into());
        self.publish();
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn my_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }

    /// Run `request` on the runtime and feed the result back through the actor.
    /// Every call is bounded by the configured timeout.
    fn spawn_request(
        &self,
        request: ApiRequest,
        wrap: impl FnOnce(Result<Value, ApiError>) -> InternalEvent + Send + 'static,
    ) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let token = sess.access_token.clone();
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        let timeout = self.config.request_timeout();
        let tag = request.tag();
        tracing::debug!(request = tag, "request start");
        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, backend.execute(&token, request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout),
            };
            if let Err(e) = &result {
                tracing::warn!(request = tag, err = %e, "request failed");
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(wrap(result))));
        });
    }

    /// One-shot timer that posts `event` back to the actor after `delay`.
    fn spawn_timer(&self, delay: Duration, event: InternalEvent) -> AbortHandle {
        let tx = self.core_sender.clone();
        self.runtime
            .spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(CoreMsg::Internal(Box::new(event)));
            })
            .abort_handle()
    }

    /// Repeating timer; the first event fires one `period` from now.
    fn spawn_interval(
        &self,
        period: Duration,
        make: impl Fn() -> InternalEvent + Send + 'static,
    ) -> AbortHandle {
        let tx = self.core_sender.clone();
        self.runtime
            .spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut interval = tokio::time::interval_at(start, period);
                loop {
                    interval.tick().await;
                    if tx.send(CoreMsg::Internal(Box::new(make()))).is_err() {
                        break;
                    }
                }
            })
            .abort_handle()
    }

    fn start_session(&mut self, user_id: String, access_token: String) {
        if self.session.is_some() {
            self.stop_session();
        }
        self.generation += 1;
        tracing::info!(user_id = %user_id, "session started");
        self.session = Some(Session {
            user_id: user_id.clone(),
            access_token,
        });
        self.state.auth = AuthState::LoggedIn { user_id };
        for key in [
            QueryKey::chat_list(false),
            QueryKey::chat_list(true),
            QueryKey::Notifications,
            QueryKey::Friends,
            QueryKey::FriendRequests,
            QueryKey::BlockedUsers,
        ] {
            self.fetch(key, FetchMode::Replace);
        }
        self.publish();
    }

    /// Tear down everything tied to the signed-in user. Pending deletions are
    /// discarded without a remote call.
    fn stop_session(&mut self) {
        self.generation += 1;
        self.session = None;
        self.cache.clear();
        self.in_flight.clear();
        self.mutations.clear();
        self.deletions.clear();
        self.stop_presence_polling();
        self.presence.clear();
        self.seen_messages.clear();
        self.search_token += 1;
        if let Some(timer) = self.search_timer.take() {
            timer.abort();
        }
        self.current_chat_id = None;

        let otp = self.state.otp.clone();
        let connection = self.state.connection;
        let rev = self.state.rev;
        self.state = AppState::empty();
        self.state.rev = rev;
        self.state.otp = otp;
        self.state.connection = connection;
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it can contain the access token.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PushReceived { name, payload_json } => {
                self.apply_push_event(&name, &payload_json);
            }
            InternalEvent::PushConnectionChanged { connected, error } => {
                self.on_push_connection_changed(connected, error);
            }
            InternalEvent::QueryFetched {
                key,
                mode,
                generation,
                result,
            } => {
                if generation != self.generation {
                    tracing::debug!(key = %key, "dropping result from previous session");
                    return;
                }
                self.on_query_fetched(key, mode, result);
            }
            InternalEvent::MutationSettled { id, result } => {
                self.settle_mutation(id, result);
            }
            InternalEvent::MessageSendResult {
                chat_id,
                local_id,
                generation,
                result,
            } => {
                if generation != self.generation {
                    return;
                }
                self.on_message_sent(&chat_id, &local_id, result);
            }
            InternalEvent::SearchResults { token, result } => {
                self.on_search_results(token, result);
            }
            InternalEvent::PresenceFetched { generation, result } => {
                self.on_presence_fetched(generation, result);
            }
            InternalEvent::DeletionGraceElapsed { message_id, token } => {
                self.on_deletion_grace_elapsed(&message_id, token);
            }
            InternalEvent::OtpTick { generation } => {
                self.on_otp_tick(generation);
            }
            InternalEvent::BannerExpired { token } => {
                self.on_banner_expired(token);
            }
            InternalEvent::SearchDebounceElapsed { token } => {
                self.on_search_debounce_elapsed(token);
            }
            InternalEvent::PresencePollTick { generation } => {
                if generation == self.presence_generation {
                    self.poll_presence();
                }
            }
        }
    }

    /// Decode a push event at the boundary and reconcile it into the cache.
    /// Anything that fails to decode is logged and dropped.
    fn apply_push_event(&mut self, name: &str, payload_json: &str) {
        let event = match PushEvent::decode(name, payload_json) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(event = name, err = %e, "push event rejected");
                return;
            }
        };
        let Some(me) = self.session.as_ref().map(|s| s.user_id.clone()) else {
            tracing::debug!(event = name, "push event while signed out; ignored");
            return;
        };
        tracing::debug!(event = event.name(), "push event");

        let deletions = &self.deletions;
        let is_hidden = |id: &str| deletions.contains(id);
        let ctx = ReconcileContext {
            me: &me,
            open_chat: self.current_chat_id.as_deref(),
            is_hidden: &is_hidden,
            now_ms: now_millis(),
        };
        let cache_rev = self.cache.revision();
        let effects = reconcile::reconcile(
            &mut self.cache,
            &mut self.presence,
            &mut self.seen_messages,
            &ctx,
            event,
        );
        if effects.is_empty() && self.cache.revision() == cache_rev {
            tracing::debug!(event = name, "push event was a no-op");
            return;
        }

        let mut sounds = Vec::new();
        for effect in effects {
            match effect {
                Effect::PlaySound {
                    chat_id,
                    message_id,
                } => sounds.push((chat_id, message_id)),
                Effect::MarkRead { chat_id } => self.mark_chat_read(&chat_id),
                Effect::Toast(msg) => {
                    self.state.toast = Some(msg);
                }
                Effect::CloseChat { chat_id } => {
                    if self.current_chat_id.as_deref() == Some(chat_id.as_str()) {
                        self.current_chat_id = None;
                        self.state.invite_link = None;
                    }
                }
                Effect::DropPendingDeletion { message_id } => {
                    self.deletions.forget(&message_id);
                }
                Effect::PresenceChanged | Effect::Refetch => {}
            }
        }

        self.refetch_invalidated();
        self.publish();
        for (chat_id, message_id) in sounds {
            self.emit_notification_sound(chat_id, message_id);
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Session
            AppAction::SignIn {
                user_id,
                access_token,
            } => {
                let user_id = user_id.trim().to_string();
                if user_id.is_empty() || access_token.trim().is_empty() {
                    self.toast("Sign-in requires a user and a token");
                    return;
                }
                self.start_session(user_id, access_token);
            }
            AppAction::SignOut => {
                if !self.is_logged_in() {
                    return;
                }
                self.stop_session();
                self.publish();
            }

            // UI
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
            }
            AppAction::ClearFormErrors => {
                if !self.state.form_errors.is_empty() {
                    self.state.form_errors.clear();
                    self.emit_state();
                }
            }

            // One-time code
            AppAction::StartOtpCountdown { deadline_ms } => {
                self.start_otp_countdown(deadline_ms);
            }

            // Lifecycle
            AppAction::Foregrounded => {
                // Native should send lifecycle signals as actions. Rust owns all state changes.
                if self.is_logged_in() {
                    self.invalidate_live_views();
                    self.refetch_invalidated();
                    self.publish();
                }
            }

            action => {
                if !self.is_logged_in() {
                    tracing::debug!(action = action.tag(), "ignored while signed out");
                    return;
                }
                self.handle_session_action(action);
            }
        }
    }

    fn handle_session_action(&mut self, action: AppAction) {
        match action {
            // Chats
            AppAction::RefreshChats => {
                self.fetch(QueryKey::chat_list(false), FetchMode::Replace);
                self.fetch(QueryKey::chat_list(true), FetchMode::Replace);
                self.publish();
            }
            AppAction::LoadMoreChats => {
                let key = QueryKey::chat_list(self.state.showing_archived);
                self.fetch(key, FetchMode::Append);
                self.emit_state();
            }
            AppAction::ShowArchived { show } => {
                self.state.showing_archived = show;
                let key = QueryKey::chat_list(show);
                if !self.cache.contains(&key) {
                    self.fetch(key, FetchMode::Replace);
                }
                self.publish();
            }
            AppAction::OpenChat { chat_id } => self.open_chat(chat_id),
            AppAction::CloseChat => {
                if self.current_chat_id.take().is_some() {
                    self.state.invite_link = None;
                    self.publish();
                }
            }
            AppAction::LoadOlderMessages { chat_id } => {
                self.fetch(QueryKey::messages(&chat_id), FetchMode::Prepend);
                self.emit_state();
            }
            AppAction::ArchiveChat { chat_id } => self.set_archived(&chat_id, true),
            AppAction::UnarchiveChat { chat_id } => self.set_archived(&chat_id, false),
            AppAction::MarkChatRead { chat_id } => self.mark_chat_read(&chat_id),

            // Messages
            AppAction::SendMessage { chat_id, content } => self.send_message(&chat_id, &content),
            AppAction::RetryMessage {
                chat_id,
                message_id,
            } => self.retry_message(&chat_id, &message_id),
            AppAction::EditMessage {
                chat_id,
                message_id,
                content,
            } => self.edit_message(&chat_id, &message_id, &content),
            AppAction::PinMessage {
                chat_id,
                message_id,
            } => self.set_pinned(&chat_id, &message_id, true),
            AppAction::UnpinMessage {
                chat_id,
                message_id,
            } => self.set_pinned(&chat_id, &message_id, false),
            AppAction::DeleteMessage {
                chat_id,
                message_id,
            } => self.delete_message(&chat_id, &message_id),
            AppAction::UndoDeleteMessage { message_id } => self.undo_delete(&message_id),

            // Users
            AppAction::BlockUser { user_id } => self.set_blocked(&user_id, true),
            AppAction::UnblockUser { user_id } => self.set_blocked(&user_id, false),
            AppAction::WatchPresence { user_ids } => self.watch_presence(user_ids),
            AppAction::SearchUsers { query } => self.search_users(&query),

            // Friends
            AppAction::SendFriendRequest { user_id } => self.send_friend_request(&user_id),
            AppAction::AcceptFriendRequest { request_id } => {
                self.answer_friend_request(&request_id, true)
            }
            AppAction::RejectFriendRequest { request_id } => {
                self.answer_friend_request(&request_id, false)
            }
            AppAction::CancelFriendRequest { request_id } => {
                self.cancel_friend_request(&request_id)
            }

            // Groups
            AppAction::CreateGroup { name, member_ids } => self.create_group(&name, member_ids),
            AppAction::UpdateGroup {
                chat_id,
                name,
                avatar,
            } => self.update_group(&chat_id, name, avatar),
            AppAction::AddGroupMember { chat_id, user_id } => {
                self.add_group_member(&chat_id, &user_id)
            }
            AppAction::RemoveGroupMember { chat_id, user_id } => {
                self.remove_group_member(&chat_id, &user_id)
            }
            AppAction::TransferOwnership {
                chat_id,
                new_owner_id,
            } => self.transfer_ownership(&chat_id, &new_owner_id),
            AppAction::GenerateInviteLink { chat_id } => self.generate_invite_link(&chat_id),
            AppAction::JoinViaInvite { code } => self.join_via_invite(&code),

            // Notifications
            AppAction::MarkNotificationsRead => self.mark_notifications_read(),

            // Handled before the session check.
            AppAction::SignIn { .. }
            | AppAction::SignOut
            | AppAction::ClearToast
            | AppAction::ClearFormErrors
            | AppAction::StartOtpCountdown { .. }
            | AppAction::Foregrounded => {}
        }
    }

    fn open_chat(&mut self, chat_id: String) {
        let chat_id = chat_id.trim().to_string();
        if chat_id.is_empty() {
            return;
        }
        if self.current_chat_id.as_deref() != Some(chat_id.as_str()) {
            self.state.invite_link = None;
        }
        self.current_chat_id = Some(chat_id.clone());
        self.fetch(QueryKey::chat(&chat_id), FetchMode::Replace);
        self.fetch(QueryKey::messages(&chat_id), FetchMode::Replace);
        let unread = self
            .cache
            .find_conversation(&chat_id)
            .map(|c| !c.read)
            .unwrap_or(false);
        if unread {
            self.mark_chat_read(&chat_id);
        }
        self.publish();
    }

    /// Mark the views a reconnect or foreground may have missed updates for.
    fn invalidate_live_views(&mut self) {
        let open = self.current_chat_id.clone();
        self.cache.invalidate_where(|key| {
            key.is_chat_list()
                || matches!(key, QueryKey::Notifications)
                || (open.is_some() && key.chat_id() == open.as_deref())
        });
    }
}
