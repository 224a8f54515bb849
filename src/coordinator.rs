/// Background coordinator: owns the connect flow across tab lifecycle and
/// persists the result
use crate::config::HandshakeConfig;
use crate::error::{ErrorCode, HandshakeError};
use crate::protocol::{ConnectReply, ExtensionRequest, Inbound, OpenTabsReply, PingReply, Reply};
use crate::store::{KeyValueStore, WalletSession};
use crate::tabs::{LoadWaiters, TabId, TabSpec, TabStatus, WindowId, restorable};
use crate::timer::{Timer, with_deadline};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// The extension APIs the coordinator drives
#[async_trait(?Send)]
pub trait Browser {
    /// Open an active tab at `url`
    async fn create_tab(&self, url: &str) -> Result<TabId, String>;

    /// `Err` is the messaging layer's delivery error; `Ok(None)` means the
    /// receiver closed the channel without answering
    async fn send_to_tab(&self, tab_id: TabId, request: &ExtensionRequest) -> Result<Option<Value>, String>;

    /// Open a focused window at `url`
    async fn create_window(&self, url: &str) -> Result<WindowId, String>;

    async fn create_tab_in_window(&self, window_id: WindowId, tab: &TabSpec) -> Result<TabId, String>;

    /// Notify other extension surfaces (popup)
    async fn broadcast(&self, request: &ExtensionRequest) -> Result<(), String>;

    async fn open_popup(&self) -> Result<(), String>;
}

/// Tabs with a connect flow in progress. A second flow for a busy tab is
/// rejected with CONNECT_IN_PROGRESS.
#[derive(Clone, Default)]
pub struct FlowRegistry {
    busy: Rc<RefCell<HashSet<TabId>>>,
}

impl FlowRegistry {
    pub fn acquire(&self, tab_id: TabId) -> Result<FlowGuard, HandshakeError> {
        if !self.busy.borrow_mut().insert(tab_id) {
            return Err(ErrorCode::ConnectInProgress.into());
        }
        Ok(FlowGuard {
            tab_id,
            registry: self.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self, tab_id: TabId) -> bool {
        self.busy.borrow().contains(&tab_id)
    }
}

/// Releases the tab when the flow ends, on every path
pub struct FlowGuard {
    tab_id: TabId,
    registry: FlowRegistry,
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        self.registry.busy.borrow_mut().remove(&self.tab_id);
    }
}

pub struct Coordinator<B: Browser, S: KeyValueStore> {
    browser: B,
    store: S,
    timer: Rc<dyn Timer>,
    config: RefCell<HandshakeConfig>,
    loads: LoadWaiters,
    flows: FlowRegistry,
}

impl<B, S> Coordinator<B, S>
where
    B: Browser + 'static,
    S: KeyValueStore + 'static,
{
    pub fn new(browser: B, store: S, timer: Rc<dyn Timer>, config: HandshakeConfig) -> Self {
        Coordinator {
            browser,
            store,
            timer,
            config: RefCell::new(config),
            loads: LoadWaiters::new(),
            flows: FlowRegistry::default(),
        }
    }

    /// Raw extension-channel entry point. A body that fails to parse for one
    /// of our kinds gets UNKNOWN_ERROR in that kind's reply shape.
    pub fn handle_inbound(self: Rc<Self>, inbound: Inbound) -> Reply {
        match inbound {
            Inbound::Request(request) => self.handle_request(request),
            Inbound::Malformed(kind) => match kind.as_str() {
                "OpenTabs" => Reply::now(&OpenTabsReply::failed(ErrorCode::UnknownError)),
                "OpenConnectTab" | "ConnectTab" => Reply::now(&ConnectReply::failed(ErrorCode::UnknownError)),
                _ => Reply::Ignored,
            },
            Inbound::Foreign => Reply::Ignored,
        }
    }

    /// Every request handled here answers asynchronously
    pub fn handle_request(self: Rc<Self>, request: ExtensionRequest) -> Reply {
        match request {
            ExtensionRequest::OpenConnectTab { url } => {
                Reply::later(async move { self.open_connect_tab(url).await })
            }
            ExtensionRequest::ConnectTab { tab_id } => {
                Reply::later(async move { self.connect_tab(tab_id).await })
            }
            ExtensionRequest::OpenTabs { tabs } => Reply::later(async move { self.open_tabs(tabs).await }),
            // content-script and popup traffic
            ExtensionRequest::Ping | ExtensionRequest::Connect | ExtensionRequest::WalletConnected { .. } => {
                Reply::Ignored
            }
        }
    }

    /// Applies to flows started after this call
    pub fn reconfigure(&self, config: HandshakeConfig) {
        *self.config.borrow_mut() = config;
    }

    fn config(&self) -> HandshakeConfig {
        self.config.borrow().clone()
    }

    /// tabs.onUpdated feed
    pub fn on_tab_updated(&self, tab_id: TabId, status: Option<TabStatus>) {
        if self.loads.on_updated(tab_id, status) {
            debug!("tab {} finished loading", tab_id);
        }
    }

    /// Open the helper page, wait for it to load, and run the handshake in it
    pub async fn open_connect_tab(&self, url: Option<String>) -> ConnectReply {
        let config = self.config();
        let url = config.resolve_connect_url(url.as_deref());
        let tab_id = match self.browser.create_tab(&url).await {
            Ok(tab_id) => tab_id,
            Err(e) => {
                warn!("could not open connect tab at {}: {}", url, e);
                return ConnectReply::failed(ErrorCode::TabCreateFailed);
            }
        };
        info!("opened connect tab {} at {}", tab_id, url);

        let _flow = match self.flows.acquire(tab_id) {
            Ok(flow) => flow,
            Err(e) => return ConnectReply::failed(e),
        };
        let loaded = match self.loads.watch(tab_id) {
            Ok(loaded) => loaded,
            Err(e) => return ConnectReply::failed(e),
        };
        if let Err(e) = loaded.wait(self.timer.as_ref(), config.tab_load_timeout()).await {
            warn!("tab {} did not finish loading: {}", tab_id, e);
            return ConnectReply::failed(e);
        }

        self.request_connect(tab_id).await
    }

    /// Run the handshake in a tab that is already open
    pub async fn connect_tab(&self, tab_id: TabId) -> ConnectReply {
        let _flow = match self.flows.acquire(tab_id) {
            Ok(flow) => flow,
            Err(e) => {
                info!("tab {} already has a connect in progress", tab_id);
                return ConnectReply::failed(e);
            }
        };

        if let Err(e) = self.ping(tab_id).await {
            return ConnectReply::failed(e);
        }
        self.request_connect(tab_id).await
    }

    async fn ping(&self, tab_id: TabId) -> Result<(), HandshakeError> {
        let sent = self.browser.send_to_tab(tab_id, &ExtensionRequest::Ping);
        let raw = match with_deadline(self.timer.as_ref(), self.config().tab_load_timeout(), sent).await? {
            Ok(raw) => raw,
            Err(e) => {
                warn!("ping to tab {} not delivered: {}", tab_id, e);
                return Err(ErrorCode::NoContentScript.into());
            }
        };

        match raw.map(serde_json::from_value::<PingReply>) {
            Some(Ok(PingReply { ok: true })) => Ok(()),
            _ => {
                warn!("tab {} has no live content script", tab_id);
                Err(ErrorCode::NoContentScript.into())
            }
        }
    }

    async fn request_connect(&self, tab_id: TabId) -> ConnectReply {
        let sent = self.browser.send_to_tab(tab_id, &ExtensionRequest::Connect);
        let raw = match with_deadline(self.timer.as_ref(), self.config().connect_timeout(), sent).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("connect to tab {} not delivered: {}", tab_id, e);
                return ConnectReply::failed(HandshakeError::message_or(Some(e), ErrorCode::NoContentScript));
            }
            Err(timeout) => {
                warn!("tab {} gave no connect reply in time", tab_id);
                return ConnectReply::failed(timeout);
            }
        };

        let reply = match raw.map(serde_json::from_value::<ConnectReply>) {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => {
                warn!("unreadable connect reply from tab {}: {}", tab_id, e);
                ConnectReply::default()
            }
            None => ConnectReply::default(),
        };

        if let Some(address) = reply.address() {
            self.wallet_connected(address).await;
        } else if let Some(error) = &reply.error {
            info!("connect in tab {} failed: {}", tab_id, error);
        }
        reply
    }

    async fn wallet_connected(&self, address: &str) {
        info!("wallet connected: {}", address);
        if let Err(e) = WalletSession::phantom(address).save(&self.store).await {
            error!("failed to persist wallet session: {}", e);
        }

        let notice = ExtensionRequest::WalletConnected {
            address: address.to_string(),
        };
        if let Err(e) = self.browser.broadcast(&notice).await {
            // nobody listening is the usual case
            debug!("wallet broadcast not delivered: {}", e);
        }
        if let Err(e) = self.browser.open_popup().await {
            debug!("could not open toolbar popup: {}", e);
        }
    }

    /// Reopen a layout: first entry in a new focused window, the rest as
    /// tabs in that window
    pub async fn open_tabs(&self, tabs: Vec<TabSpec>) -> OpenTabsReply {
        let tabs = restorable(tabs);
        let Some((first, rest)) = tabs.split_first() else {
            return OpenTabsReply::failed(ErrorCode::NoTabs);
        };

        let window_id = match self.browser.create_window(&first.url).await {
            Ok(window_id) => window_id,
            Err(e) => {
                warn!("could not open window for layout: {}", e);
                return OpenTabsReply::failed(HandshakeError::message_or(Some(e), ErrorCode::WindowCreateFailed));
            }
        };

        for tab in rest {
            if let Err(e) = self.browser.create_tab_in_window(window_id, tab).await {
                warn!("skipping {} in window {}: {}", tab.url, window_id, e);
            }
        }
        info!("restored {} tabs into window {}", tabs.len(), window_id);

        OpenTabsReply::opened(window_id)
    }

    #[cfg(test)]
    pub(crate) fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    #[cfg(test)]
    pub(crate) fn loads(&self) -> &LoadWaiters {
        &self.loads
    }
}
