/// Service-worker side: runs the coordinator
use super::chrome::{ChromeBrowser, ChromeStore, listen_extension_requests, listen_tab_updates};
use crate::config::HandshakeConfig;
use crate::coordinator::Coordinator;
use crate::tabs::TabStatus;
use crate::timer::BrowserTimer;
use std::rc::Rc;
use wasm_bindgen_futures::spawn_local;

/// Listeners are attached synchronously so a waking worker sees the event
/// that woke it; stored overrides are applied once storage answers
pub fn start() {
    let coordinator = Rc::new(Coordinator::new(
        ChromeBrowser,
        ChromeStore,
        Rc::new(BrowserTimer),
        HandshakeConfig::default(),
    ));

    {
        let coordinator = coordinator.clone();
        listen_tab_updates(move |tab_id, status| {
            coordinator.on_tab_updated(tab_id, status.as_deref().and_then(TabStatus::parse));
        });
    }

    {
        let coordinator = coordinator.clone();
        listen_extension_requests(move |inbound| coordinator.clone().handle_inbound(inbound));
    }

    spawn_local(async move {
        let config = HandshakeConfig::load(&ChromeStore).await;
        coordinator.reconfigure(config);
    });
}
