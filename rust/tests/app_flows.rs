use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use social_core::{
    ApiError, AppAction, AuthState, ConnectionBanner, FfiApp, FieldError, MessageStatus,
};
use tempfile::{tempdir, TempDir};

mod support;
use support::{message_json, wait_until, write_config, Collector, MockBackend, ME};

const WAIT: Duration = Duration::from_secs(3);

struct Session {
    _dir: TempDir,
    app: Arc<FfiApp>,
    backend: Arc<MockBackend>,
    updates: Collector,
}

fn signed_in() -> Session {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap().to_string();
    write_config(&data_dir);
    let backend = MockBackend::new();
    let app = FfiApp::with_backend(data_dir, backend.clone());
    let updates = Collector::new();
    app.listen_for_updates(Box::new(updates.clone()));

    app.dispatch(AppAction::SignIn {
        user_id: ME.into(),
        access_token: "token".into(),
    });
    wait_until("chat list loaded", WAIT, || app.state().chat_list.len() == 2);
    wait_until("initial fetches sent", WAIT, || {
        backend.count("FetchBlockedUsers") == 1
    });
    // Let the remaining first-page answers land before pushes arrive.
    std::thread::sleep(Duration::from_millis(150));
    Session {
        _dir: dir,
        app,
        backend,
        updates,
    }
}

fn open_c1(s: &Session) {
    s.app.dispatch(AppAction::OpenChat {
        chat_id: "c1".into(),
    });
    wait_until("messages loaded", WAIT, || message_ids(&s.app).len() == 2);
}

fn message_ids(app: &FfiApp) -> Vec<String> {
    app.state()
        .current_chat
        .map(|c| c.messages.into_iter().map(|m| m.id).collect())
        .unwrap_or_default()
}

fn push_message(app: &FfiApp, id: &str, chat_id: &str, sender: &str) {
    let payload = json!({ "message": message_json(id, chat_id, sender, "new", 3_000) });
    app.push_event("message:received".into(), payload.to_string());
}

fn last_message(app: &FfiApp, chat_id: &str) -> Option<String> {
    app.state().chat(chat_id).and_then(|c| c.last_message.clone())
}

fn is_read(app: &FfiApp, chat_id: &str) -> Option<bool> {
    app.state().chat(chat_id).map(|c| c.is_read)
}

#[test]
fn sign_in_loads_lists_and_sign_out_clears_them() {
    let s = signed_in();
    assert_eq!(
        s.app.state().auth,
        AuthState::LoggedIn {
            user_id: ME.into()
        }
    );
    assert_eq!(s.backend.count("FetchChats"), 2);

    s.app.dispatch(AppAction::SignOut);
    wait_until("signed out", WAIT, || {
        s.app.state().auth == AuthState::LoggedOut
    });
    assert!(s.app.state().chat_list.is_empty());
}

#[test]
fn replayed_message_event_is_applied_once() {
    let s = signed_in();
    open_c1(&s);

    push_message(&s.app, "m3", "c1", "u2");
    push_message(&s.app, "m3", "c1", "u2");
    wait_until("m3 shown", WAIT, || message_ids(&s.app).len() == 3);
    // Flush the actor with a later event before asserting nothing else changed.
    push_message(&s.app, "m4", "c2", "u2");
    wait_until("m4 listed", WAIT, || {
        last_message(&s.app, "c2").as_deref() == Some("new")
    });

    assert_eq!(message_ids(&s.app), ["m1", "m2", "m3"]);
    assert_eq!(s.updates.sounds(), ["m3", "m4"]);
}

#[test]
fn read_flag_follows_the_sender() {
    let s = signed_in();
    assert_eq!(is_read(&s.app, "c1"), Some(true));

    push_message(&s.app, "m5", "c1", "u2");
    wait_until("c1 unread", WAIT, || is_read(&s.app, "c1") == Some(false));
    assert_eq!(last_message(&s.app, "c1").as_deref(), Some("new"));

    push_message(&s.app, "m6", "c1", ME);
    wait_until("c1 read", WAIT, || is_read(&s.app, "c1") == Some(true));
}

#[test]
fn open_chat_receiving_message_marks_it_read() {
    let s = signed_in();
    open_c1(&s);
    push_message(&s.app, "m3", "c1", "u2");
    wait_until("mark read sent", WAIT, || s.backend.count("MarkChatRead") == 1);
    assert_eq!(is_read(&s.app, "c1"), Some(true));
}

#[test]
fn failed_archive_rolls_back() {
    let s = signed_in();
    s.backend.fail(
        "ArchiveChat",
        ApiError::Server {
            status: 500,
            message: "boom".into(),
        },
    );
    s.app.dispatch(AppAction::ArchiveChat {
        chat_id: "c1".into(),
    });
    wait_until("archive failed", WAIT, || s.updates.last_toast().is_some());

    let state = s.app.state();
    assert!(state.chat_list.iter().any(|c| c.chat_id == "c1"));
    assert!(state.archived_chat_list.is_empty());
    // The chat left the active list before the server answered.
    assert!(s
        .updates
        .states()
        .iter()
        .any(|st| st.archived_chat_list.iter().any(|c| c.chat_id == "c1")));
}

#[test]
fn undo_before_grace_sends_nothing() {
    let s = signed_in();
    open_c1(&s);

    s.app.dispatch(AppAction::DeleteMessage {
        chat_id: "c1".into(),
        message_id: "m1".into(),
    });
    wait_until("m1 hidden", WAIT, || message_ids(&s.app) == ["m2"]);
    assert_eq!(s.app.state().pending_deletions[0].message_id, "m1");

    s.app.dispatch(AppAction::UndoDeleteMessage {
        message_id: "m1".into(),
    });
    wait_until("m1 restored", WAIT, || message_ids(&s.app) == ["m1", "m2"]);
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(s.backend.count("DeleteMessage"), 0);
    assert!(s.app.state().pending_deletions.is_empty());
}

#[test]
fn delete_commits_exactly_once_after_grace() {
    let s = signed_in();
    open_c1(&s);

    s.app.dispatch(AppAction::DeleteMessage {
        chat_id: "c1".into(),
        message_id: "m1".into(),
    });
    // A second tap on the same message while the first is pending.
    s.app.dispatch(AppAction::DeleteMessage {
        chat_id: "c1".into(),
        message_id: "m1".into(),
    });
    wait_until("delete sent", WAIT, || s.backend.count("DeleteMessage") == 1);
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(s.backend.count("DeleteMessage"), 1);
    assert_eq!(message_ids(&s.app), ["m2"]);
    assert!(s.app.state().pending_deletions.is_empty());
}

#[test]
fn failed_delete_restores_message() {
    let s = signed_in();
    open_c1(&s);
    s.backend.fail(
        "DeleteMessage",
        ApiError::Server {
            status: 503,
            message: "try later".into(),
        },
    );
    s.app.dispatch(AppAction::DeleteMessage {
        chat_id: "c1".into(),
        message_id: "m2".into(),
    });
    wait_until("delete attempted", WAIT, || s.backend.count("DeleteMessage") == 1);
    wait_until("m2 restored", WAIT, || message_ids(&s.app) == ["m1", "m2"]);
    assert!(s.updates.last_toast().is_some());
}

#[test]
fn sign_out_discards_pending_deletions() {
    let s = signed_in();
    open_c1(&s);
    s.app.dispatch(AppAction::DeleteMessage {
        chat_id: "c1".into(),
        message_id: "m1".into(),
    });
    s.app.dispatch(AppAction::SignOut);
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(s.backend.count("DeleteMessage"), 0);
}

#[test]
fn double_block_sends_one_request() {
    let s = signed_in();
    s.backend.delay("BlockUser", Duration::from_millis(300));
    for _ in 0..2 {
        s.app.dispatch(AppAction::BlockUser {
            user_id: "u5".into(),
        });
    }
    wait_until("block listed", WAIT, || {
        s.app.state().blocked_users.iter().any(|u| u.id == "u5")
    });
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(s.backend.count("BlockUser"), 1);
}

#[test]
fn otp_countdown_is_superseded_and_survives_restart() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap().to_string();
    write_config(&data_dir);
    let app = FfiApp::with_backend(data_dir.clone(), MockBackend::new());
    assert!(app.state().otp.is_timeout);

    let now = chrono::Utc::now().timestamp_millis();
    app.dispatch(AppAction::StartOtpCountdown {
        deadline_ms: now + 3_000,
    });
    wait_until("short countdown", WAIT, || !app.state().otp.is_timeout);
    app.dispatch(AppAction::StartOtpCountdown {
        deadline_ms: now + 90_000,
    });
    wait_until("long countdown", WAIT, || app.state().otp.remaining_secs > 60);
    std::thread::sleep(Duration::from_millis(1_200));
    assert!(app.state().otp.remaining_secs > 60);
    assert!(!app.state().otp.is_timeout);

    let restarted = FfiApp::with_backend(data_dir, MockBackend::new());
    wait_until("countdown restored", WAIT, || {
        restarted.state().otp.remaining_secs > 60
    });
}

#[test]
fn rejected_edit_publishes_field_errors_and_restores_content() {
    let s = signed_in();
    open_c1(&s);
    let fields = vec![FieldError {
        field: "content".into(),
        message: "too long".into(),
    }];
    s.backend.fail(
        "EditMessage",
        ApiError::Validation {
            message: "Invalid message".into(),
            fields: fields.clone(),
        },
    );
    s.app.dispatch(AppAction::EditMessage {
        chat_id: "c1".into(),
        message_id: "m1".into(),
        content: "x".repeat(5_000),
    });
    wait_until("field errors", WAIT, || !s.app.state().form_errors.is_empty());
    assert_eq!(s.app.state().form_errors, fields);
    let chat = s.app.state().current_chat.unwrap();
    assert_eq!(chat.messages[0].content, "first");
    assert!(!chat.messages[0].edited);
}

#[test]
fn repeated_notification_counts_once() {
    let s = signed_in();
    let payload = json!({"notification": {
        "id": "n1", "kind": "mention", "text": "Ada mentioned you",
        "createdAt": 5_000, "read": false
    }})
    .to_string();
    s.app.push_event("notification:new".into(), payload.clone());
    s.app.push_event("notification:new".into(), payload);
    wait_until("notification shown", WAIT, || {
        s.app.state().notifications.unread_count == 1
    });
    push_message(&s.app, "m9", "c2", "u2");
    wait_until("flushed", WAIT, || s.updates.sounds().len() == 1);

    let state = s.app.state();
    assert_eq!(state.notifications.items.len(), 1);
    assert_eq!(state.notifications.unread_count, 1);
}

#[test]
fn malformed_events_change_nothing() {
    let s = signed_in();
    open_c1(&s);
    let before = s.app.state();
    s.app
        .push_event("message:received".into(), "not json".into());
    s.app
        .push_event("message:received".into(), r#"{"message":{"id":"m7"}}"#.into());
    s.app.push_event("typing:start".into(), "{}".into());
    push_message(&s.app, "m8", "c2", "u2");
    wait_until("flushed", WAIT, || {
        last_message(&s.app, "c2").as_deref() == Some("new")
    });

    let after = s.app.state();
    assert_eq!(message_ids(&s.app), ["m1", "m2"]);
    assert_eq!(after.toast, before.toast);
    assert_eq!(s.updates.sounds(), ["m8"]);
}

#[test]
fn reconnect_shows_banner_then_refetches() {
    let s = signed_in();
    let fetched = s.backend.count("FetchChats");

    s.app.push_connection_changed(false, Some("socket closed".into()));
    wait_until("offline", WAIT, || {
        s.app.state().connection == ConnectionBanner::Offline
    });
    s.app.push_connection_changed(true, None);
    wait_until("back online", WAIT, || {
        s.app.state().connection == ConnectionBanner::BackOnline
    });
    wait_until("banner gone", WAIT, || {
        s.app.state().connection == ConnectionBanner::Online
    });
    assert!(s.backend.count("FetchChats") > fetched);
}

#[test]
fn failed_send_can_be_retried() {
    let s = signed_in();
    open_c1(&s);
    s.backend
        .fail("SendMessage", ApiError::Network("offline".into()));
    s.app.dispatch(AppAction::SendMessage {
        chat_id: "c1".into(),
        content: "hi there".into(),
    });

    let failed = || {
        s.app.state().current_chat.and_then(|c| {
            c.messages
                .into_iter()
                .find(|m| m.status == MessageStatus::Failed)
        })
    };
    wait_until("send failed", WAIT, || failed().is_some());
    let local = failed().unwrap();
    assert!(local.is_mine);
    assert_eq!(local.content, "hi there");

    s.backend.clear_failures();
    s.app.dispatch(AppAction::RetryMessage {
        chat_id: "c1".into(),
        message_id: local.id.clone(),
    });
    wait_until("sent", WAIT, || message_ids(&s.app).contains(&"srv-1".to_string()));
    assert!(!message_ids(&s.app).contains(&local.id));
    assert_eq!(s.backend.count("SendMessage"), 2);
}

#[test]
fn search_is_debounced() {
    let s = signed_in();
    for q in ["a", "ad", "ada"] {
        s.app.dispatch(AppAction::SearchUsers { query: q.into() });
    }
    wait_until("results", WAIT, || !s.app.state().search.results.is_empty());
    let state = s.app.state();
    assert_eq!(state.search.query, "ada");
    assert_eq!(state.search.results[0].name.as_deref(), Some("ada"));
    assert_eq!(s.backend.count("SearchUsers"), 1);
}
