use crate::state::ConnectionBanner;
use crate::updates::InternalEvent;

use super::AppCore;

impl AppCore {
    /// Push transport state as reported by the platform. Going offline shows a
    /// banner until the connection returns; coming back shows a short "back
    /// online" banner and refetches what may have been missed.
    pub(super) fn on_push_connection_changed(&mut self, connected: bool, error: Option<String>) {
        if !connected {
            match error.as_deref() {
                Some(err) => tracing::warn!(err, "push channel disconnected"),
                None => tracing::info!("push channel disconnected"),
            }
            self.banner_token += 1;
            if self.state.connection != ConnectionBanner::Offline {
                self.state.connection = ConnectionBanner::Offline;
                self.emit_state();
            }
            return;
        }

        if self.state.connection != ConnectionBanner::Offline {
            // Initial connect, or a duplicate report.
            return;
        }
        tracing::info!("push channel reconnected");
        self.banner_token += 1;
        let token = self.banner_token;
        self.state.connection = ConnectionBanner::BackOnline;
        self.spawn_timer(
            self.config.back_online_banner(),
            InternalEvent::BannerExpired { token },
        );
        if self.is_logged_in() {
            self.invalidate_live_views();
            self.refetch_invalidated();
        }
        self.publish();
    }

    pub(super) fn on_banner_expired(&mut self, token: u64) {
        if token != self.banner_token || self.state.connection != ConnectionBanner::BackOnline {
            return;
        }
        self.state.connection = ConnectionBanner::Online;
        self.emit_state();
    }
}
