/// chrome.* bindings: storage, tabs, windows, runtime messaging
use super::{from_js, js_error_text, to_js};
use crate::coordinator::Browser;
use crate::protocol::{ExtensionRequest, Inbound, Reply};
use crate::store::KeyValueStore;
use crate::tabs::{TabId, TabSpec, WindowId};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

// Import JS bridge functions
#[wasm_bindgen(module = "/extension.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn storageGet(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn tabsCreate(url: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn tabsSendMessage(tab_id: i32, message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn runtimeSendMessage(message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn tabsQueryActive() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn windowsCreate(url: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn tabsCreateInWindow(window_id: i32, url: &str, pinned: bool) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn actionOpenPopup() -> Result<(), JsValue>;

    fn runtimeGetUrl(path: &str) -> String;

    fn onRuntimeMessage(handler: &js_sys::Function);

    fn onTabUpdated(handler: &js_sys::Function);
}

/// chrome.storage.local
pub struct ChromeStore;

#[async_trait(?Send)]
impl KeyValueStore for ChromeStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, String> {
        let value = storageGet(key)
            .await
            .map_err(|e| format!("Failed to get storage: {}", js_error_text(e)))?;
        match from_js(value)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), String> {
        storageSet(key, to_js(&value)?)
            .await
            .map_err(|e| format!("Failed to save storage: {}", js_error_text(e)))
    }
}

/// chrome.tabs / chrome.windows / chrome.action as seen from the service worker
pub struct ChromeBrowser;

fn as_id(value: JsValue, what: &str) -> Result<i32, String> {
    value
        .as_f64()
        .map(|id| id as i32)
        .ok_or_else(|| format!("{} has no id", what))
}

#[async_trait(?Send)]
impl Browser for ChromeBrowser {
    async fn create_tab(&self, url: &str) -> Result<TabId, String> {
        let id = tabsCreate(url).await.map_err(js_error_text)?;
        as_id(id, "tab")
    }

    async fn send_to_tab(&self, tab_id: TabId, request: &ExtensionRequest) -> Result<Option<Value>, String> {
        let response = tabsSendMessage(tab_id, to_js(request)?)
            .await
            .map_err(js_error_text)?;
        match from_js(response)? {
            Value::Null => Ok(None),
            body => Ok(Some(body)),
        }
    }

    async fn create_window(&self, url: &str) -> Result<WindowId, String> {
        let id = windowsCreate(url).await.map_err(js_error_text)?;
        as_id(id, "window")
    }

    async fn create_tab_in_window(&self, window_id: WindowId, tab: &TabSpec) -> Result<TabId, String> {
        let id = tabsCreateInWindow(window_id, &tab.url, tab.pinned)
            .await
            .map_err(js_error_text)?;
        as_id(id, "tab")
    }

    async fn broadcast(&self, request: &ExtensionRequest) -> Result<(), String> {
        send_runtime_message(request).await.map(|_| ())
    }

    async fn open_popup(&self) -> Result<(), String> {
        actionOpenPopup().await.map_err(js_error_text)
    }
}

/// chrome.runtime.sendMessage; `Ok(None)` when nobody answered with a body
pub async fn send_runtime_message(request: &ExtensionRequest) -> Result<Option<Value>, String> {
    let response = runtimeSendMessage(to_js(request)?)
        .await
        .map_err(js_error_text)?;
    match from_js(response)? {
        Value::Null => Ok(None),
        body => Ok(Some(body)),
    }
}

pub async fn open_tab(url: &str) -> Result<TabId, String> {
    let id = tabsCreate(url).await.map_err(js_error_text)?;
    as_id(id, "tab")
}

/// Active tab of the window the caller belongs to
pub async fn active_tab() -> Result<TabId, String> {
    let id = tabsQueryActive().await.map_err(js_error_text)?;
    as_id(id, "active tab")
}

pub fn extension_url(path: &str) -> String {
    runtimeGetUrl(path)
}

/// chrome.runtime.onMessage. A `Later` reply keeps the channel open by
/// returning true to Chrome and answers from a spawned task.
pub fn listen_extension_requests<H>(handler: H)
where
    H: Fn(Inbound) -> Reply + 'static,
{
    let closure = Closure::wrap(Box::new(move |message: JsValue, send_response: js_sys::Function| -> bool {
        let raw = match from_js(message) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("ignoring unreadable runtime message: {}", e);
                return false;
            }
        };

        match handler(ExtensionRequest::decode(raw)) {
            Reply::Now(body) => {
                respond(&send_response, &body);
                false
            }
            Reply::Later(work) => {
                spawn_local(async move {
                    let body = work.await;
                    respond(&send_response, &body);
                });
                true
            }
            Reply::Ignored => false,
        }
    }) as Box<dyn Fn(JsValue, js_sys::Function) -> bool>);

    onRuntimeMessage(closure.as_ref().unchecked_ref());
    closure.forget();
}

/// chrome.tabs.onUpdated, reduced to (tab id, status)
pub fn listen_tab_updates<H>(handler: H)
where
    H: Fn(TabId, Option<String>) + 'static,
{
    let closure = Closure::wrap(Box::new(move |tab_id: i32, status: JsValue| {
        handler(tab_id, status.as_string());
    }) as Box<dyn Fn(i32, JsValue)>);

    onTabUpdated(closure.as_ref().unchecked_ref());
    closure.forget();
}

// A closed channel (tab gone, popup closed) is an accepted terminal state
fn respond(send_response: &js_sys::Function, body: &Value) {
    let sent = to_js(body).and_then(|js| {
        send_response
            .call1(&JsValue::NULL, &js)
            .map(|_| ())
            .map_err(js_error_text)
    });
    if let Err(e) = sent {
        debug!("reply channel closed: {}", e);
    }
}
