#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    SignIn {
        user_id: String,
        access_token: String,
    },
    SignOut,

    // Chats
    RefreshChats,
    LoadMoreChats,
    ShowArchived {
        show: bool,
    },
    OpenChat {
        chat_id: String,
    },
    CloseChat,
    LoadOlderMessages {
        chat_id: String,
    },
    ArchiveChat {
        chat_id: String,
    },
    UnarchiveChat {
        chat_id: String,
    },
    MarkChatRead {
        chat_id: String,
    },

    // Messages
    SendMessage {
        chat_id: String,
        content: String,
    },
    RetryMessage {
        chat_id: String,
        message_id: String,
    },
    EditMessage {
        chat_id: String,
        message_id: String,
        content: String,
    },
    PinMessage {
        chat_id: String,
        message_id: String,
    },
    UnpinMessage {
        chat_id: String,
        message_id: String,
    },
    DeleteMessage {
        chat_id: String,
        message_id: String,
    },
    UndoDeleteMessage {
        message_id: String,
    },

    // Users
    BlockUser {
        user_id: String,
    },
    UnblockUser {
        user_id: String,
    },
    WatchPresence {
        user_ids: Vec<String>,
    },
    SearchUsers {
        query: String,
    },

    // Friends
    SendFriendRequest {
        user_id: String,
    },
    AcceptFriendRequest {
        request_id: String,
    },
    RejectFriendRequest {
        request_id: String,
    },
    CancelFriendRequest {
        request_id: String,
    },

    // Groups
    CreateGroup {
        name: String,
        member_ids: Vec<String>,
    },
    UpdateGroup {
        chat_id: String,
        name: Option<String>,
        avatar: Option<String>,
    },
    AddGroupMember {
        chat_id: String,
        user_id: String,
    },
    RemoveGroupMember {
        chat_id: String,
        user_id: String,
    },
    TransferOwnership {
        chat_id: String,
        new_owner_id: String,
    },
    GenerateInviteLink {
        chat_id: String,
    },
    JoinViaInvite {
        code: String,
    },

    // Notifications
    MarkNotificationsRead,

    // One-time code
    StartOtpCountdown {
        deadline_ms: i64,
    },

    // UI
    ClearToast,
    ClearFormErrors,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes secrets like `access_token`).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::SignIn { .. } => "SignIn",
            AppAction::SignOut => "SignOut",

            // Chats
            AppAction::RefreshChats => "RefreshChats",
            AppAction::LoadMoreChats => "LoadMoreChats",
            AppAction::ShowArchived { .. } => "ShowArchived",
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat => "CloseChat",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",
            AppAction::ArchiveChat { .. } => "ArchiveChat",
            AppAction::UnarchiveChat { .. } => "UnarchiveChat",
            AppAction::MarkChatRead { .. } => "MarkChatRead",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::EditMessage { .. } => "EditMessage",
            AppAction::PinMessage { .. } => "PinMessage",
            AppAction::UnpinMessage { .. } => "UnpinMessage",
            AppAction::DeleteMessage { .. } => "DeleteMessage",
            AppAction::UndoDeleteMessage { .. } => "UndoDeleteMessage",

            // Users
            AppAction::BlockUser { .. } => "BlockUser",
            AppAction::UnblockUser { .. } => "UnblockUser",
            AppAction::WatchPresence { .. } => "WatchPresence",
            AppAction::SearchUsers { .. } => "SearchUsers",

            // Friends
            AppAction::SendFriendRequest { .. } => "SendFriendRequest",
            AppAction::AcceptFriendRequest { .. } => "AcceptFriendRequest",
            AppAction::RejectFriendRequest { .. } => "RejectFriendRequest",
            AppAction::CancelFriendRequest { .. } => "CancelFriendRequest",

            // Groups
            AppAction::CreateGroup { .. } => "CreateGroup",
            AppAction::UpdateGroup { .. } => "UpdateGroup",
            AppAction::AddGroupMember { .. } => "AddGroupMember",
            AppAction::RemoveGroupMember { .. } => "RemoveGroupMember",
            AppAction::TransferOwnership { .. } => "TransferOwnership",
            AppAction::GenerateInviteLink { .. } => "GenerateInviteLink",
            AppAction::JoinViaInvite { .. } => "JoinViaInvite",

            // Notifications
            AppAction::MarkNotificationsRead => "MarkNotificationsRead",

            // One-time code
            AppAction::StartOtpCountdown { .. } => "StartOtpCountdown",

            // UI
            AppAction::ClearToast => "ClearToast",
            AppAction::ClearFormErrors => "ClearFormErrors",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
