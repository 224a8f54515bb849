/// Page-realm side: finds `window.solana` and runs the agent
use super::js_error_message;
use super::page::{WindowPort, listen_window_messages};
use crate::agent::{Agent, ProviderLocator, RealmFlag, WalletProvider};
use crate::error::{ErrorCode, HandshakeError};
use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use log::{error, info};
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};

const INSTALLED_MARKER: &str = "__tabdexWalletAgent__";
const PROVIDER_KEY: &str = "solana";
const VENDOR_MARKER: &str = "isPhantom";

fn get(target: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

/// Marker property on the page's window, visible to every injected copy
pub struct WindowFlag;

impl RealmFlag for WindowFlag {
    fn is_set(&self) -> bool {
        web_sys::window()
            .and_then(|window| get(&window, INSTALLED_MARKER))
            .is_some_and(|marker| marker.is_truthy())
    }

    fn set(&self) {
        if let Some(window) = web_sys::window() {
            let _ = Reflect::set(&window, &JsValue::from_str(INSTALLED_MARKER), &JsValue::TRUE);
        }
    }
}

pub struct PhantomLocator;

impl ProviderLocator for PhantomLocator {
    type Provider = PhantomProvider;

    fn locate(&self) -> Option<PhantomProvider> {
        let window = web_sys::window()?;
        let provider = get(&window, PROVIDER_KEY)?;
        let is_phantom = get(&provider, VENDOR_MARKER).is_some_and(|marker| marker.is_truthy());
        is_phantom.then_some(PhantomProvider { inner: provider })
    }
}

pub struct PhantomProvider {
    inner: JsValue,
}

impl PhantomProvider {
    async fn request_public_key(&self, only_if_trusted: bool) -> Result<JsValue, JsValue> {
        let connect: Function = get(&self.inner, "connect")
            .ok_or_else(|| JsValue::from_str("provider has no connect"))?
            .dyn_into()?;

        let options = Object::new();
        Reflect::set(&options, &JsValue::from_str("onlyIfTrusted"), &JsValue::from_bool(only_if_trusted))?;

        let pending = connect.call1(&self.inner, &options)?;
        let response = JsFuture::from(Promise::resolve(&pending)).await?;
        get(&response, "publicKey").ok_or_else(|| JsValue::from_str(ErrorCode::ConnectFailed.as_str()))
    }
}

#[async_trait(?Send)]
impl WalletProvider for PhantomProvider {
    async fn connect(&self, only_if_trusted: bool) -> Result<String, HandshakeError> {
        let public_key = self
            .request_public_key(only_if_trusted)
            .await
            .map_err(|e| HandshakeError::message_or(js_error_message(&e), ErrorCode::ConnectFailed))?;

        let to_string: Function = get(&public_key, "toString")
            .and_then(|f| f.dyn_into().ok())
            .ok_or(HandshakeError::Code(ErrorCode::ConnectFailed))?;
        to_string
            .call0(&public_key)
            .ok()
            .and_then(|address| address.as_string())
            .filter(|address| !address.is_empty())
            .ok_or(HandshakeError::Code(ErrorCode::ConnectFailed))
    }
}

/// Entry point for the injected script. Repeat injections are no-ops.
pub fn start() {
    let agent = match Agent::install(&WindowFlag, PhantomLocator, WindowPort) {
        Ok(agent) => Rc::new(agent),
        Err(e) => {
            info!("{}", e);
            return;
        }
    };

    let listening = listen_window_messages(move |message| {
        let agent = agent.clone();
        spawn_local(async move {
            agent.handle(message).await;
        });
    });
    if let Err(e) = listening {
        error!("wallet agent cannot listen: {}", e);
    }
}
