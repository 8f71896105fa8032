use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppCore;

const DEFAULT_API_BASE_URL: &str = "http://localhost:4000/api";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DELETE_GRACE_MS: u64 = 5_000;
const DEFAULT_PRESENCE_POLL_SECS: u64 = 30;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_BACK_ONLINE_BANNER_MS: u64 = 3_000;

pub(super) const CONFIG_FILE_NAME: &str = "social_config.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) api_base_url: Option<String>,
    pub(super) disable_network: Option<bool>,
    pub(super) request_timeout_ms: Option<u64>,
    pub(super) delete_grace_ms: Option<u64>,
    pub(super) presence_poll_secs: Option<u64>,
    pub(super) search_debounce_ms: Option<u64>,
    pub(super) back_online_banner_ms: Option<u64>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "ignoring unreadable config");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = AppConfig {
        api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
        disable_network: Some(false),
        request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
        delete_grace_ms: Some(DEFAULT_DELETE_GRACE_MS),
        presence_poll_secs: Some(DEFAULT_PRESENCE_POLL_SECS),
        search_debounce_ms: Some(DEFAULT_SEARCH_DEBOUNCE_MS),
        back_online_banner_ms: Some(DEFAULT_BACK_ONLINE_BANNER_MS),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".to_string())
}

impl AppConfig {
    pub(super) fn api_base_url(&self) -> String {
        if let Ok(url) = std::env::var("SOCIAL_API_URL") {
            let url = url.trim();
            if !url.is_empty() {
                return url.to_string();
            }
        }
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .to_string()
    }

    pub(super) fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.request_timeout_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }

    pub(super) fn delete_grace(&self) -> Duration {
        Duration::from_millis(self.delete_grace_ms.unwrap_or(DEFAULT_DELETE_GRACE_MS))
    }

    pub(super) fn presence_poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.presence_poll_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_PRESENCE_POLL_SECS),
        )
    }

    pub(super) fn search_debounce(&self) -> Duration {
        Duration::from_millis(
            self.search_debounce_ms
                .unwrap_or(DEFAULT_SEARCH_DEBOUNCE_MS),
        )
    }

    pub(super) fn back_online_banner(&self) -> Duration {
        Duration::from_millis(
            self.back_online_banner_ms
                .unwrap_or(DEFAULT_BACK_ONLINE_BANNER_MS),
        )
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("SOCIAL_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"delete_grace_ms": 250, "unknown_key": true}"#).unwrap();
        assert_eq!(config.delete_grace(), Duration::from_millis(250));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.presence_poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn zero_timeouts_fall_back_to_defaults() {
        let config = AppConfig {
            request_timeout_ms: Some(0),
            presence_poll_secs: Some(0),
            ..AppConfig::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.presence_poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn default_json_round_trips() {
        let json = default_app_config_json();
        let config: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.disable_network, Some(false));
        assert_eq!(config.delete_grace_ms, Some(DEFAULT_DELETE_GRACE_MS));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert!(config.api_base_url.is_none());
        assert_eq!(config.search_debounce(), Duration::from_millis(300));
    }
}
