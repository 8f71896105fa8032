//! The one optimistic-mutation flow every local edit goes through.
//!
//! A [`Mutation`] bundles the local patch (which hands back its own inverse),
//! the remote request, and the keys to invalidate once the server agrees.
//! `begin_mutation` applies the patch and fires the request; `settle_mutation`
//! either confirms or rolls back when the result comes in.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::api::ApiRequest;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{ApiError, FailureKind};
use crate::state::BusyState;
use crate::updates::InternalEvent;

use super::AppCore;

/// Undo for a local patch.
pub(super) type Inverse = Box<dyn FnOnce(&mut QueryCache)>;
type Patch = Box<dyn FnOnce(&mut QueryCache) -> Option<Inverse>>;
type OnSuccess = Box<dyn FnOnce(&mut AppCore, Value)>;
type BusyFlag = fn(&mut BusyState) -> &mut bool;

pub(super) struct Mutation {
    guard: String,
    request: ApiRequest,
    patch: Option<Patch>,
    invalidate: Vec<QueryKey>,
    on_success: Option<OnSuccess>,
    success_toast: Option<String>,
    failure_label: String,
    busy: Option<BusyFlag>,
    form: bool,
}

impl Mutation {
    /// `guard` names the (operation, entity) pair; a second mutation with the
    /// same guard is rejected while the first is in flight.
    pub(super) fn new(
        guard: impl Into<String>,
        request: ApiRequest,
        failure_label: impl Into<String>,
    ) -> Self {
        Self {
            guard: guard.into(),
            request,
            patch: None,
            invalidate: Vec::new(),
            on_success: None,
            success_toast: None,
            failure_label: failure_label.into(),
            busy: None,
            form: false,
        }
    }

    /// Local change applied before the request goes out. Returns the inverse,
    /// or `None` if there was nothing cached to change.
    pub(super) fn patch(
        mut self,
        f: impl FnOnce(&mut QueryCache) -> Option<Inverse> + 'static,
    ) -> Self {
        self.patch = Some(Box::new(f));
        self
    }

    pub(super) fn invalidate(mut self, keys: impl IntoIterator<Item = QueryKey>) -> Self {
        self.invalidate.extend(keys);
        self
    }

    /// Reconcile with the server's canonical response.
    pub(super) fn on_success(mut self, f: impl FnOnce(&mut AppCore, Value) + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub(super) fn success_toast(mut self, msg: impl Into<String>) -> Self {
        self.success_toast = Some(msg.into());
        self
    }

    pub(super) fn busy(mut self, flag: BusyFlag) -> Self {
        self.busy = Some(flag);
        self
    }

    /// The mutation backs a form: validation errors are published as field errors.
    pub(super) fn form(mut self) -> Self {
        self.form = true;
        self
    }
}

struct InFlight {
    guard: String,
    inverse: Option<Inverse>,
    invalidate: Vec<QueryKey>,
    on_success: Option<OnSuccess>,
    success_toast: Option<String>,
    failure_label: String,
    busy: Option<BusyFlag>,
    form: bool,
}

#[derive(Default)]
pub(super) struct MutationBook {
    next_id: u64,
    in_flight: HashMap<u64, InFlight>,
    guards: HashSet<String>,
}

impl MutationBook {
    pub(super) fn is_guarded(&self, guard: &str) -> bool {
        self.guards.contains(guard)
    }

    /// Forget everything in flight; late results will find nothing to settle.
    pub(super) fn clear(&mut self) {
        self.in_flight.clear();
        self.guards.clear();
    }

    #[cfg(test)]
    pub(super) fn last_id(&self) -> u64 {
        self.next_id
    }

    fn insert(&mut self, entry: InFlight) -> u64 {
        self.next_id += 1;
        self.guards.insert(entry.guard.clone());
        self.in_flight.insert(self.next_id, entry);
        self.next_id
    }

    fn take(&mut self, id: u64) -> Option<InFlight> {
        let entry = self.in_flight.remove(&id)?;
        self.guards.remove(&entry.guard);
        Some(entry)
    }
}

impl AppCore {
    /// Apply `mutation` locally and send it. Returns false when it was
    /// rejected as a duplicate of one still in flight.
    pub(super) fn begin_mutation(&mut self, mutation: Mutation) -> bool {
        if !self.is_logged_in() {
            return false;
        }
        if self.mutations.is_guarded(&mutation.guard) {
            tracing::debug!(guard = %mutation.guard, "mutation already in flight; ignored");
            return false;
        }

        let Mutation {
            guard,
            request,
            patch,
            invalidate,
            on_success,
            success_toast,
            failure_label,
            busy,
            form,
        } = mutation;

        let inverse = patch.and_then(|apply| apply(&mut self.cache));
        if let Some(flag) = busy {
            *flag(&mut self.state.busy) = true;
        }
        tracing::info!(guard = %guard, request = request.tag(), "mutation start");
        let id = self.mutations.insert(InFlight {
            guard,
            inverse,
            invalidate,
            on_success,
            success_toast,
            failure_label,
            busy,
            form,
        });
        self.spawn_request(request, move |result| InternalEvent::MutationSettled {
            id,
            result,
        });
        self.publish();
        true
    }

    pub(super) fn settle_mutation(&mut self, id: u64, result: Result<Value, ApiError>) {
        let Some(entry) = self.mutations.take(id) else {
            tracing::debug!(id, "settled mutation no longer tracked");
            return;
        };
        if let Some(flag) = entry.busy {
            *flag(&mut self.state.busy) = false;
        }

        match result {
            Ok(value) => {
                tracing::info!(guard = %entry.guard, "mutation confirmed");
                if entry.form {
                    self.state.form_errors.clear();
                }
                if let Some(on_success) = entry.on_success {
                    on_success(self, value);
                }
                for key in &entry.invalidate {
                    self.cache.invalidate(key);
                }
                if let Some(msg) = entry.success_toast {
                    self.state.toast = Some(msg);
                }
            }
            Err(e) => {
                tracing::warn!(guard = %entry.guard, err = %e, "mutation failed; rolling back");
                if let Some(inverse) = entry.inverse {
                    inverse(&mut self.cache);
                }
                let label = entry.failure_label;
                let msg = match e.kind() {
                    FailureKind::Network => {
                        format!("{label}. Check your connection and try again.")
                    }
                    FailureKind::Validation => {
                        if entry.form {
                            self.state.form_errors = e.field_errors().to_vec();
                        }
                        format!("{label}: {e}")
                    }
                    FailureKind::Permission => format!("{label}: you don't have permission"),
                    FailureKind::NotFound => {
                        // Stale reference: refetch whatever mentioned it.
                        for key in &entry.invalidate {
                            self.cache.invalidate(key);
                        }
                        format!("{label}: it no longer exists")
                    }
                    FailureKind::Server => format!("{label}: {e}"),
                };
                self.state.toast = Some(msg);
            }
        }

        self.refetch_invalidated();
        self.publish();
    }
}

// Inverse helpers shared by the mutation sites.

pub(super) fn inverse(f: impl FnOnce(&mut QueryCache) + 'static) -> Option<Inverse> {
    Some(Box::new(f))
}
