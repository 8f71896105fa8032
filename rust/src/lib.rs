mod actions;
mod api;
mod cache;
mod core;
mod countdown;
mod error;
mod events;
mod logging;
mod model;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
// Not exposed over UniFFI; lets hosts and integration tests supply their own transport.
pub use api::{decode, ApiRequest, Backend, HttpMethod};
pub use error::{ApiError, FailureKind, FieldError};
pub use model::*;
pub use state::*;
pub use updates::*;

/// Return the default `social_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        Self::start(data_dir, None)
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Hand over one named event from the platform's push socket. The payload
    /// is raw JSON; malformed payloads are logged and dropped.
    pub fn push_event(&self, name: String, payload_json: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::PushReceived { name, payload_json },
        )));
    }

    pub fn push_connection_changed(&self, connected: bool, error: Option<String>) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::PushConnectionChanged { connected, error },
        )));
    }
}

impl FfiApp {
    /// Like [`FfiApp::new`] but talking to `backend` instead of the configured server.
    pub fn with_backend(data_dir: String, backend: Arc<dyn Backend>) -> Arc<Self> {
        Self::start(data_dir, Some(backend))
    }

    fn start(data_dir: String, backend: Option<Arc<dyn Backend>>) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                backend,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }
}
