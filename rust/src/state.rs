use crate::error::FieldError;
use crate::model::{FriendRequest, InviteLink, MessageStatus, Notification, Presence, UserSummary};

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub busy: BusyState,
    pub chat_list: Vec<ChatSummary>,
    pub archived_chat_list: Vec<ChatSummary>,
    pub showing_archived: bool,
    pub can_load_more_chats: bool,
    pub current_chat: Option<ChatViewState>,
    pub pending_deletions: Vec<PendingDeletionView>,
    pub notifications: NotificationsState,
    pub friends: Vec<UserSummary>,
    pub friend_requests: FriendRequestsState,
    pub blocked_users: Vec<UserSummary>,
    pub presence: Vec<Presence>,
    pub search: SearchState,
    pub invite_link: Option<InviteLink>,
    pub otp: OtpState,
    pub connection: ConnectionBanner,
    pub form_errors: Vec<FieldError>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            busy: BusyState::idle(),
            chat_list: vec![],
            archived_chat_list: vec![],
            showing_archived: false,
            can_load_more_chats: false,
            current_chat: None,
            pending_deletions: vec![],
            notifications: NotificationsState::empty(),
            friends: vec![],
            friend_requests: FriendRequestsState::empty(),
            blocked_users: vec![],
            presence: vec![],
            search: SearchState::empty(),
            invite_link: None,
            otp: OtpState::expired(),
            connection: ConnectionBanner::Online,
            form_errors: vec![],
            toast: None,
        }
    }

    pub fn chat(&self, chat_id: &str) -> Option<&ChatSummary> {
        self.chat_list
            .iter()
            .chain(self.archived_chat_list.iter())
            .find(|c| c.chat_id == chat_id)
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user_id: String },
}

/// "In flight" flags for long-ish operations that the UI should reflect.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_chats: bool,
    pub loading_more_chats: bool,
    pub loading_older_messages: bool,
    pub creating_group: bool,
    pub joining_group: bool,
    pub generating_invite_link: bool,
    pub searching: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_chats: false,
            loading_more_chats: false,
            loading_older_messages: false,
            creating_group: false,
            joining_group: false,
            generating_invite_link: false,
            searching: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub is_group: bool,
    pub title: String,
    pub avatar: Option<String>,
    pub members: Vec<UserSummary>,
    pub owner_id: Option<String>,
    pub last_message: Option<String>,
    pub last_message_sender_id: Option<String>,
    pub last_message_at: Option<i64>,
    pub is_read: bool,
    pub archived: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatViewState {
    pub chat_id: String,
    pub is_group: bool,
    pub title: String,
    pub members: Vec<UserSummary>,
    pub owner_id: Option<String>,
    pub is_owner: bool,
    pub messages: Vec<ChatMessage>,
    pub pinned_message_ids: Vec<String>,
    pub can_load_older: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub timestamp: i64,
    pub is_mine: bool,
    pub status: MessageStatus,
    pub failure_reason: Option<String>,
    pub pinned: bool,
    pub edited: bool,
    pub read_by: Vec<String>,
}

/// A delete the user can still undo.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct PendingDeletionView {
    pub message_id: String,
    pub chat_id: String,
    pub commits_at: i64,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct NotificationsState {
    pub items: Vec<Notification>,
    pub unread_count: u32,
}

impl NotificationsState {
    pub fn empty() -> Self {
        Self {
            items: vec![],
            unread_count: 0,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct FriendRequestsState {
    pub incoming: Vec<FriendRequest>,
    pub outgoing: Vec<FriendRequest>,
}

impl FriendRequestsState {
    pub fn empty() -> Self {
        Self {
            incoming: vec![],
            outgoing: vec![],
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<UserSummary>,
}

impl SearchState {
    pub fn empty() -> Self {
        Self {
            query: String::new(),
            results: vec![],
        }
    }
}

/// One-time-code resend gate as the UI sees it.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct OtpState {
    pub remaining_secs: u64,
    pub is_timeout: bool,
}

impl OtpState {
    pub fn expired() -> Self {
        Self {
            remaining_secs: 0,
            is_timeout: true,
        }
    }
}

/// Push-connection indicator. `Offline` persists until the connection returns;
/// `BackOnline` is shown briefly and then drops back to `Online`.
#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionBanner {
    Online,
    Offline,
    BackOnline,
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
