/// window.postMessage channel shared by the content script and the page agent
use super::{from_js, to_js};
use crate::protocol::{PageMessage, PagePort};
use log::debug;
use wasm_bindgen::prelude::*;
use web_sys::MessageEvent;

pub struct WindowPort;

impl PagePort for WindowPort {
    fn post(&self, message: &PageMessage) -> Result<(), String> {
        let window = web_sys::window().ok_or("No window object")?;
        window
            .post_message(&to_js(message)?, "*")
            .map_err(|e| format!("postMessage failed: {:?}", e))
    }
}

/// Deliver our window messages to `handler`; frames and foreign page
/// traffic never reach it
pub fn listen_window_messages<H>(handler: H) -> Result<(), String>
where
    H: Fn(PageMessage) + 'static,
{
    let window = web_sys::window().ok_or("No window object")?;
    let own = JsValue::from(window.clone());

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        let same_window = event
            .source()
            .is_some_and(|source| js_sys::Object::is(source.as_ref(), &own));
        let raw = match from_js(event.data()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("ignoring window message: {}", e);
                return;
            }
        };
        if let Some(message) = PageMessage::decode(same_window, raw) {
            handler(message);
        }
    }) as Box<dyn Fn(MessageEvent)>);

    window
        .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
        .map_err(|e| format!("Failed to listen for messages: {:?}", e))?;
    closure.forget();
    Ok(())
}
