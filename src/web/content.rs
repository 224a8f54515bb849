/// Content-script side: injects the agent and runs the bridge
use super::chrome::{extension_url, listen_extension_requests};
use super::page::{WindowPort, listen_window_messages};
use crate::bridge::{AGENT_SCRIPT_ID, AGENT_SCRIPT_PATH, Bridge, ReadyState, ScriptInjector, inject_agent};
use crate::config::HandshakeConfig;
use crate::protocol::{BridgeMessage, Inbound, PageMessage, PagePort, Reply};
use crate::timer::BrowserTimer;
use js_sys::Reflect;
use log::{error, warn};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use web_sys::{AddEventListenerOptions, Document};

fn document() -> Result<Document, String> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| "No document".to_string())
}

/// `<script id=... src=chrome-extension://.../agent.js>` appended to the page
pub struct DomInjector;

impl ScriptInjector for DomInjector {
    fn is_injected(&self) -> bool {
        document().is_ok_and(|doc| doc.get_element_by_id(AGENT_SCRIPT_ID).is_some())
    }

    fn inject(&self) -> Result<(), String> {
        let doc = document()?;
        let container = doc
            .document_element()
            .or_else(|| doc.head().map(Into::into))
            .ok_or("Page has no root element yet")?;

        let script = doc
            .create_element("script")
            .map_err(|e| format!("Failed to create script: {:?}", e))?;
        script
            .set_attribute("id", AGENT_SCRIPT_ID)
            .and_then(|_| script.set_attribute("type", "text/javascript"))
            .and_then(|_| script.set_attribute("src", &extension_url(AGENT_SCRIPT_PATH)))
            .map_err(|e| format!("Failed to configure script: {:?}", e))?;

        // the node stays in the page so later checks see it
        let on_load = Closure::once_into_js(|| {
            if let Err(e) = WindowPort.post(&PageMessage::ToBridge(BridgeMessage::AgentReady)) {
                warn!("could not announce agent: {}", e);
            }
        });
        script
            .add_event_listener_with_callback("load", on_load.unchecked_ref())
            .map_err(|e| format!("Failed to watch script load: {:?}", e))?;

        container
            .append_child(&script)
            .map_err(|e| format!("Failed to append script: {:?}", e))?;
        Ok(())
    }
}

fn ready_state(doc: &Document) -> ReadyState {
    let state = Reflect::get(doc, &JsValue::from_str("readyState"))
        .ok()
        .and_then(|state| state.as_string())
        .unwrap_or_default();
    ReadyState::parse(&state)
}

/// Inject now if the DOM is usable, else once on DOMContentLoaded
fn bootstrap_injection() -> Result<(), String> {
    let doc = document()?;
    if ready_state(&doc).can_inject() {
        inject_agent(&DomInjector);
        return Ok(());
    }

    let on_ready = Closure::once_into_js(|| {
        inject_agent(&DomInjector);
    });
    let options = AddEventListenerOptions::new();
    options.set_once(true);
    web_sys::window()
        .ok_or("No window object")?
        .add_event_listener_with_callback_and_add_event_listener_options(
            "DOMContentLoaded",
            on_ready.unchecked_ref(),
            &options,
        )
        .map_err(|e| format!("Failed to wait for DOM: {:?}", e))
}

/// Entry point for the content script
pub fn start() {
    let config = HandshakeConfig::default();
    let bridge = Rc::new(Bridge::new(WindowPort, Rc::new(BrowserTimer), config.page_reply_timeout()));

    {
        let bridge = bridge.clone();
        if let Err(e) = listen_window_messages(move |message| bridge.handle_page_message(message)) {
            error!("bridge cannot listen to the page: {}", e);
            return;
        }
    }

    listen_extension_requests(move |inbound| match inbound {
        Inbound::Request(request) => bridge.handle_request(request),
        Inbound::Malformed(_) | Inbound::Foreign => Reply::Ignored,
    });

    if let Err(e) = bootstrap_injection() {
        error!("bridge cannot inject the wallet agent: {}", e);
    }
}
