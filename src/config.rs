/// Handshake settings: helper URL, install URL and deadlines
use crate::store::{CONFIG_KEY, KeyValueStore};
use crate::timer::MAX_TIMEOUT_MS;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONNECT_URL: &str = "https://tab-dex-ai.vercel.app/extension";
pub const DEFAULT_INSTALL_URL: &str = "https://phantom.app/download";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HandshakeConfig {
    /// Page opened by OpenConnectTab when the caller gives no URL
    pub connect_url: String,
    /// Offered to the user when the page has no wallet
    pub install_url: String,
    /// Bridge waiting on the agent; covers the wallet's approval popup
    pub page_reply_timeout_ms: u64,
    /// Coordinator waiting on a new tab to reach `complete`
    pub tab_load_timeout_ms: u64,
    /// Coordinator waiting on the bridge's Connect reply
    pub connect_timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            connect_url: DEFAULT_CONNECT_URL.to_string(),
            install_url: DEFAULT_INSTALL_URL.to_string(),
            page_reply_timeout_ms: 120_000,
            tab_load_timeout_ms: 30_000,
            connect_timeout_ms: 150_000,
        }
    }
}

impl HandshakeConfig {
    pub fn page_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.page_reply_timeout_ms)
    }

    pub fn tab_load_timeout(&self) -> Duration {
        Duration::from_millis(self.tab_load_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The caller's URL if it is a usable http(s) URL, otherwise the default
    pub fn resolve_connect_url(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) if is_web_url(url) => url.to_string(),
            Some(url) => {
                warn!("ignoring unusable connect url {:?}", url);
                self.connect_url.clone()
            }
            None => self.connect_url.clone(),
        }
    }

    /// Replace unusable fields with their defaults
    pub fn validated(self) -> HandshakeConfig {
        let defaults = HandshakeConfig::default();
        HandshakeConfig {
            connect_url: if is_web_url(&self.connect_url) { self.connect_url } else { defaults.connect_url },
            install_url: if is_web_url(&self.install_url) { self.install_url } else { defaults.install_url },
            page_reply_timeout_ms: timeout_or(self.page_reply_timeout_ms, defaults.page_reply_timeout_ms),
            tab_load_timeout_ms: timeout_or(self.tab_load_timeout_ms, defaults.tab_load_timeout_ms),
            connect_timeout_ms: timeout_or(self.connect_timeout_ms, defaults.connect_timeout_ms),
        }
    }

    /// Overrides stored under `handshakeConfig`, defaults for anything missing
    pub async fn load(store: &dyn KeyValueStore) -> HandshakeConfig {
        match store.get(CONFIG_KEY).await {
            Ok(Some(raw)) => match serde_json::from_value::<HandshakeConfig>(raw) {
                Ok(config) => {
                    info!("loaded handshake config overrides");
                    config.validated()
                }
                Err(e) => {
                    warn!("invalid handshake config, using defaults: {}", e);
                    HandshakeConfig::default()
                }
            },
            Ok(None) => HandshakeConfig::default(),
            Err(e) => {
                warn!("could not read handshake config, using defaults: {}", e);
                HandshakeConfig::default()
            }
        }
    }
}

fn is_web_url(s: &str) -> bool {
    Url::parse(s).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
}

fn timeout_or(value: u64, fallback: u64) -> u64 {
    if value == 0 || value > MAX_TIMEOUT_MS { fallback } else { value }
}
