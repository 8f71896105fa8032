use serde_json::Value;

use crate::cache::{FetchMode, QueryKey};
use crate::error::ApiError;
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Side effect: a message from someone else arrived.
    PlayNotificationSound {
        rev: u64,
        chat_id: String,
        message_id: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::PlayNotificationSound { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Push channel (forwarded by the platform transport)
    PushReceived {
        name: String,
        payload_json: String,
    },
    PushConnectionChanged {
        connected: bool,
        error: Option<String>,
    },

    // Async results. `generation` ties a result to the session that asked for it.
    QueryFetched {
        key: QueryKey,
        mode: FetchMode,
        generation: u64,
        result: Result<Value, ApiError>,
    },
    MutationSettled {
        id: u64,
        result: Result<Value, ApiError>,
    },
    MessageSendResult {
        chat_id: String,
        local_id: String,
        generation: u64,
        result: Result<Value, ApiError>,
    },
    SearchResults {
        token: u64,
        result: Result<Value, ApiError>,
    },
    PresenceFetched {
        generation: u64,
        result: Result<Value, ApiError>,
    },

    // Timers
    DeletionGraceElapsed {
        message_id: String,
        token: u64,
    },
    OtpTick {
        generation: u64,
    },
    BannerExpired {
        token: u64,
    },
    SearchDebounceElapsed {
        token: u64,
    },
    PresencePollTick {
        generation: u64,
    },
}
