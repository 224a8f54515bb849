/// Browser glue: chrome.* and window implementations of the core seams,
/// plus one entry point per execution context
pub mod background;
pub mod chrome;
pub mod content;
pub mod inpage;
pub mod page;

use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Plain JS objects, never `Map`s, so chrome messaging can clone them
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

pub(crate) fn from_js(value: JsValue) -> Result<serde_json::Value, String> {
    if value.is_undefined() || value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("Failed to parse: {:?}", e))
}

/// Text of a thrown value: strings as-is, errors by `message`
pub(crate) fn js_error_message(err: &JsValue) -> Option<String> {
    if let Some(text) = err.as_string() {
        return Some(text);
    }
    js_sys::Reflect::get(err, &JsValue::from_str("message"))
        .ok()
        .and_then(|message| message.as_string())
}

pub(crate) fn js_error_text(err: JsValue) -> String {
    js_error_message(&err).unwrap_or_else(|| format!("{:?}", err))
}
