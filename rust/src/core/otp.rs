use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::countdown::{GatePhase, TickOutcome};
use crate::state::{now_millis, OtpState};
use crate::updates::InternalEvent;

use super::AppCore;

const CLIENT_STATE_FILE: &str = "client_state.json";

/// Small bits of client state that survive restarts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClientState {
    #[serde(default)]
    pub(super) otp_expires_at: Option<i64>,
}

pub(super) fn load_client_state(data_dir: &str) -> anyhow::Result<ClientState> {
    let path = Path::new(data_dir).join(CLIENT_STATE_FILE);
    if !path.exists() {
        return Ok(ClientState::default());
    }
    let bytes =
        std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

pub(super) fn save_client_state(data_dir: &str, state: &ClientState) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir).with_context(|| format!("create {data_dir}"))?;
    let path = Path::new(data_dir).join(CLIENT_STATE_FILE);
    let json = serde_json::to_vec_pretty(state).context("encode client state")?;
    std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))
}

impl AppCore {
    /// Gate the one-time-code resend action until `deadline_ms`.
    pub(super) fn start_otp_countdown(&mut self, deadline_ms: i64) {
        self.arm_otp(deadline_ms);
        // A deadline already in the past leaves nothing to restore later.
        self.persist_otp_deadline(self.otp.deadline_ms());
        self.emit_state();
    }

    /// Re-arm from a deadline persisted by a previous run, if still in the future.
    pub(super) fn restore_otp_countdown(&mut self) {
        let saved = match load_client_state(&self.data_dir) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(err = %format!("{e:#}"), "client state unreadable; ignoring");
                return;
            }
        };
        let Some(deadline_ms) = saved.otp_expires_at else {
            return;
        };
        self.arm_otp(deadline_ms);
        if self.otp.is_expired() {
            self.persist_otp_deadline(None);
        } else {
            tracing::info!(remaining = self.otp.remaining_secs(), "otp countdown restored");
        }
    }

    fn arm_otp(&mut self, deadline_ms: i64) {
        if let Some(generation) = self.otp.arm(deadline_ms, now_millis()) {
            let ticker = self.spawn_interval(Duration::from_secs(1), move || {
                InternalEvent::OtpTick { generation }
            });
            self.otp.attach_ticker(generation, ticker);
        }
        self.sync_otp_state();
    }

    pub(super) fn on_otp_tick(&mut self, generation: u64) {
        match self.otp.tick(generation) {
            TickOutcome::Stale => {}
            TickOutcome::Counting { .. } => {
                self.sync_otp_state();
                self.emit_state();
            }
            TickOutcome::Expired => {
                tracing::debug!("otp countdown expired");
                self.persist_otp_deadline(None);
                self.sync_otp_state();
                self.emit_state();
            }
        }
    }

    fn sync_otp_state(&mut self) {
        self.state.otp = match self.otp.phase() {
            GatePhase::Armed => OtpState::expired(),
            GatePhase::Counting { remaining_secs } => OtpState {
                remaining_secs,
                is_timeout: false,
            },
        };
    }

    fn persist_otp_deadline(&self, deadline_ms: Option<i64>) {
        let state = ClientState {
            otp_expires_at: deadline_ms,
        };
        if let Err(e) = save_client_state(&self.data_dir, &state) {
            tracing::warn!(err = %format!("{e:#}"), "failed to persist client state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        assert_eq!(load_client_state(data_dir).unwrap(), ClientState::default());

        let state = ClientState {
            otp_expires_at: Some(1_700_000_060_000),
        };
        save_client_state(data_dir, &state).unwrap();
        let raw = std::fs::read_to_string(dir.path().join(CLIENT_STATE_FILE)).unwrap();
        assert!(raw.contains("otpExpiresAt"));
        assert_eq!(load_client_state(data_dir).unwrap(), state);
    }

    #[test]
    fn corrupt_client_state_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLIENT_STATE_FILE), "{not json").unwrap();
        let err = load_client_state(dir.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains(CLIENT_STATE_FILE));
    }
}
